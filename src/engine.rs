//! Shared query plumbing: upload-to-dump resolution, moniker and package
//! lookups, and cursor seeding. The per-operation resolvers (definitions,
//! references, exists) build on these helpers.

use crate::bundles::{Bundles, MonikerTable};
use crate::config::Config;
use crate::cursor::{Cursor, SameDumpCursor};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::model::{Dump, Location, MonikerData, PackageInformationData};
use crate::store::Store;
use crate::util;

pub struct Engine {
    store: Store,
    bundles: Box<dyn Bundles>,
    remote_dump_limit: usize,
}

impl Engine {
    pub fn new(store: Store, bundles: Box<dyn Bundles>) -> Self {
        Self {
            store,
            bundles,
            remote_dump_limit: Config::get().remote_dump_limit,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn bundles(&self) -> &dyn Bundles {
        self.bundles.as_ref()
    }

    pub(crate) fn remote_dump_limit(&self) -> usize {
        self.remote_dump_limit
    }

    /// Resolve an upload id to its completed dump, if it still exists.
    pub(crate) fn dump_for_upload(&self, deadline: Deadline, upload_id: i64) -> Result<Option<Dump>> {
        deadline.check()?;
        self.store.get_dump_by_id(upload_id)
    }

    /// Resolve a moniker's package information from the dump that attached
    /// it. Monikers without a package-information id resolve to nothing.
    pub(crate) fn lookup_package_information(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        moniker: &MonikerData,
    ) -> Result<Option<PackageInformationData>> {
        let Some(package_information_id) = &moniker.package_information_id else {
            return Ok(None);
        };
        let info =
            self.bundles
                .package_information(deadline, dump_id, path, package_information_id)?;
        Ok(Some(info))
    }

    /// Follow a moniker into the dump defining its package and search that
    /// dump's symbol table. Returns bundle-local locations (tagged with the
    /// defining dump id, paths dump-relative) plus the total row count.
    /// Yields nothing when the moniker carries no package information or no
    /// dump defines the package.
    pub(crate) fn lookup_moniker(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        moniker: &MonikerData,
        table: MonikerTable,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> Result<(Vec<Location>, usize)> {
        let Some(info) = self.lookup_package_information(deadline, dump_id, path, moniker)? else {
            return Ok((Vec::new(), 0));
        };

        deadline.check()?;
        let Some(defining_dump) =
            self.store
                .get_package(&moniker.scheme, &info.name, &info.version)?
        else {
            return Ok((Vec::new(), 0));
        };

        self.bundles.moniker_results(
            deadline,
            defining_dump.id,
            table,
            &moniker.scheme,
            &moniker.identifier,
            skip,
            take,
        )
    }

    /// Seed a reference cursor from a position: resolve the dump, fetch the
    /// monikers on the enclosing ranges once (innermost first), and start
    /// the `same-dump` phase at offset zero.
    pub(crate) fn make_reference_cursor(
        &self,
        deadline: Deadline,
        upload_id: i64,
        file: &str,
        line: i64,
        character: i64,
    ) -> Result<Cursor> {
        let dump = self
            .dump_for_upload(deadline, upload_id)?
            .ok_or(Error::MissingDump)?;
        let path_in_dump = util::path_relative_to_root(&dump.root, file);

        let range_monikers =
            self.bundles
                .monikers_by_position(deadline, dump.id, &path_in_dump, line, character)?;
        let flattened: Vec<MonikerData> = range_monikers.into_iter().flatten().collect();

        Ok(Cursor::SameDump(SameDumpCursor {
            dump_id: dump.id,
            path: path_in_dump,
            line,
            character,
            monikers: flattened,
            skip_results: 0,
        }))
    }
}
