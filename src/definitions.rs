//! "Go to definition" and hover.
//!
//! Definitions first ask the dump's own definition table. When the LSIF
//! data has no direct answer the resolver walks the monikers attached to
//! the enclosing ranges, innermost first: import monikers jump to the dump
//! defining the package, everything else falls back to the local
//! definition table keyed by moniker, which catches definitions that were
//! never linked into a result set but carry the right monikers.

use crate::bundles::MonikerTable;
use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::locations::resolve_locations_in_dump;
use crate::model::{Dump, Range, ResolvedLocation, MONIKER_KIND_IMPORT};
use crate::util;

impl Engine {
    /// Definitions of the symbol at a position within an upload's dump.
    pub fn definitions(
        &self,
        deadline: Deadline,
        upload_id: i64,
        file: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<ResolvedLocation>> {
        let dump = self
            .dump_for_upload(deadline, upload_id)?
            .ok_or(Error::MissingDump)?;
        let path_in_dump = util::path_relative_to_root(&dump.root, file);
        self.definitions_raw(deadline, &dump, &path_in_dump, line, character)
    }

    pub(crate) fn definitions_raw(
        &self,
        deadline: Deadline,
        dump: &Dump,
        path_in_dump: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<ResolvedLocation>> {
        let locations = self
            .bundles()
            .definitions(deadline, dump.id, path_in_dump, line, character)?;
        if !locations.is_empty() {
            return Ok(resolve_locations_in_dump(dump, locations));
        }

        let range_monikers =
            self.bundles()
                .monikers_by_position(deadline, dump.id, path_in_dump, line, character)?;

        for monikers in range_monikers {
            for moniker in monikers {
                if moniker.kind == MONIKER_KIND_IMPORT {
                    let (results, _) = self.lookup_moniker(
                        deadline,
                        dump.id,
                        path_in_dump,
                        &moniker,
                        MonikerTable::Definition,
                        None,
                        None,
                    )?;
                    if !results.is_empty() {
                        return self.resolve_locations(deadline, results);
                    }
                } else {
                    // Not imported from another dump; search our own
                    // definition table by moniker.
                    let (results, _) = self.bundles().moniker_results(
                        deadline,
                        dump.id,
                        MonikerTable::Definition,
                        &moniker.scheme,
                        &moniker.identifier,
                        None,
                        None,
                    )?;
                    if !results.is_empty() {
                        return Ok(resolve_locations_in_dump(dump, results));
                    }
                }
            }
        }

        Ok(Vec::new())
    }

    /// Hover documentation at a position. Falls back to the definition
    /// site's hover when the local dump has none: the defining dump is the
    /// one that indexed the doc comment.
    pub fn hover(
        &self,
        deadline: Deadline,
        upload_id: i64,
        file: &str,
        line: i64,
        character: i64,
    ) -> Result<Option<(String, Range)>> {
        let dump = self
            .dump_for_upload(deadline, upload_id)?
            .ok_or(Error::MissingDump)?;
        let path_in_dump = util::path_relative_to_root(&dump.root, file);

        let local = self
            .bundles()
            .hover(deadline, dump.id, &path_in_dump, line, character)?;
        if local.is_some() {
            return Ok(local);
        }

        let resolved = self.definitions_raw(deadline, &dump, &path_in_dump, line, character)?;
        let Some(definition) = resolved.first() else {
            return Ok(None);
        };

        let definition_path =
            util::path_relative_to_root(&definition.dump.root, &definition.path);
        self.bundles().hover(
            deadline,
            definition.dump.id,
            &definition_path,
            definition.range.start.line,
            definition.range.start.character,
        )
    }
}
