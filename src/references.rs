//! Paginated reference resolution.
//!
//! A reference query is the ordered, lazy concatenation of four result
//! streams: references inside the dump at the queried position, references
//! reachable through the defining dump of each import moniker, dumps in the
//! same repository that import the package, and dumps in other
//! repositories that import it. The cursor records the position in that
//! virtual stream; one `resolve_page` call drains phases into the page
//! until the soft limit is spent or the chain terminates.
//!
//! The phase graph has depth four, so the driver is a bounded loop with an
//! explicit cursor value rather than recursion.

use crate::bloom::apply_bloom_filter;
use crate::bundles::MonikerTable;
use crate::cursor::{Cursor, DefinitionMonikersCursor, RemoteReferencesCursor, SameDumpCursor};
use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::Result;
use crate::locations::resolve_locations_in_dump;
use crate::model::{PackageReference, ResolvedLocation, MONIKER_KIND_IMPORT};

/// Which remote candidate listing a batch refill draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteScope {
    SameRepo,
    RemoteRepo,
}

pub struct ReferencePageResolver<'a> {
    engine: &'a Engine,
    deadline: Deadline,
    repository_id: i64,
    commit: String,
    remote_dump_limit: usize,
    limit: usize,
}

impl<'a> ReferencePageResolver<'a> {
    pub fn new(
        engine: &'a Engine,
        deadline: Deadline,
        repository_id: i64,
        commit: String,
        limit: usize,
    ) -> Self {
        Self {
            engine,
            deadline,
            repository_id,
            commit,
            remote_dump_limit: engine.remote_dump_limit(),
            limit,
        }
    }

    /// Produce one page: advance through phases, accumulating locations,
    /// until the limit is spent or every phase is exhausted. Returns the
    /// page and the cursor to resume from; no cursor means done.
    pub fn resolve_page(&self, cursor: Cursor) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        let mut locations: Vec<ResolvedLocation> = Vec::new();
        let mut current = Some(cursor);

        while let Some(cursor) = current {
            let budget = self.limit - locations.len();
            let (mut page, in_phase_next) = self.dispatch(budget, &cursor)?;
            locations.append(&mut page);

            current = match in_phase_next {
                Some(next) => Some(next),
                None => self.transition(&cursor)?,
            };

            if locations.len() >= self.limit {
                break;
            }
        }

        Ok((locations, current))
    }

    fn dispatch(
        &self,
        limit: usize,
        cursor: &Cursor,
    ) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        match cursor {
            Cursor::SameDump(cursor) => self.same_dump_references(limit, cursor),
            Cursor::DefinitionMonikers(cursor) => {
                self.definition_moniker_references(limit, cursor)
            }
            Cursor::SameRepo(cursor) => {
                self.remote_references(limit, cursor, RemoteScope::SameRepo)
            }
            Cursor::RemoteRepo(cursor) => {
                self.remote_references(limit, cursor, RemoteScope::RemoteRepo)
            }
        }
    }

    /// Where a phase goes once its stream is exhausted.
    fn transition(&self, cursor: &Cursor) -> Result<Option<Cursor>> {
        match cursor {
            Cursor::SameDump(cursor) => Ok(Some(Cursor::DefinitionMonikers(
                DefinitionMonikersCursor {
                    dump_id: cursor.dump_id,
                    path: cursor.path.clone(),
                    monikers: cursor.monikers.clone(),
                    skip_results: 0,
                },
            ))),
            Cursor::DefinitionMonikers(cursor) => {
                // The remote phases need package coordinates; the first
                // moniker with resolvable package information provides
                // them. Without one there is nothing left to search.
                for moniker in &cursor.monikers {
                    let Some(info) = self.engine.lookup_package_information(
                        self.deadline,
                        cursor.dump_id,
                        &cursor.path,
                        moniker,
                    )?
                    else {
                        continue;
                    };
                    return Ok(Some(Cursor::SameRepo(RemoteReferencesCursor {
                        dump_id: cursor.dump_id,
                        scheme: moniker.scheme.clone(),
                        identifier: moniker.identifier.clone(),
                        name: info.name,
                        version: info.version,
                        dump_ids: Vec::new(),
                        total_dumps_when_batching: 0,
                        skip_dumps_when_batching: 0,
                        skip_dumps_in_batch: 0,
                        skip_results_in_dump: 0,
                    })));
                }
                Ok(None)
            }
            Cursor::SameRepo(cursor) => Ok(Some(Cursor::RemoteRepo(RemoteReferencesCursor {
                dump_id: cursor.dump_id,
                scheme: cursor.scheme.clone(),
                identifier: cursor.identifier.clone(),
                name: cursor.name.clone(),
                version: cursor.version.clone(),
                dump_ids: Vec::new(),
                total_dumps_when_batching: 0,
                skip_dumps_when_batching: 0,
                skip_dumps_in_batch: 0,
                skip_results_in_dump: 0,
            }))),
            Cursor::RemoteRepo(_) => Ok(None),
        }
    }

    /// Phase 1: references at the position plus every row of the current
    /// dump's reference table matching the position's monikers. The moniker
    /// search is needed because a find-references on a *reference* must
    /// also surface references to the governing definition, and those may
    /// not be fully linked in the LSIF data.
    fn same_dump_references(
        &self,
        limit: usize,
        cursor: &SameDumpCursor,
    ) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        // The dump can vanish between pages; skip ahead rather than fail.
        let Some(dump) = self.engine.dump_for_upload(self.deadline, cursor.dump_id)? else {
            return Ok((Vec::new(), None));
        };

        let mut locations = self.engine.bundles().references(
            self.deadline,
            dump.id,
            &cursor.path,
            cursor.line,
            cursor.character,
        )?;

        for moniker in &cursor.monikers {
            let (results, _) = self.engine.bundles().moniker_results(
                self.deadline,
                dump.id,
                MonikerTable::Reference,
                &moniker.scheme,
                &moniker.identifier,
                None,
                None,
            )?;
            locations.extend(results);
        }

        let total = locations.len();
        let start = cursor.skip_results.min(total);
        let end = (cursor.skip_results + limit).min(total);
        let page: Vec<_> = locations[start..end].to_vec();
        let resolved = resolve_locations_in_dump(&dump, page);

        let next = if end < total {
            Some(Cursor::SameDump(SameDumpCursor {
                skip_results: end,
                ..cursor.clone()
            }))
        } else {
            None
        };

        Ok((resolved, next))
    }

    /// Phase 2: for each import moniker, search the reference table of the
    /// dump defining its package. The first moniker yielding a non-empty
    /// page wins; pagination continues within that moniker.
    fn definition_moniker_references(
        &self,
        limit: usize,
        cursor: &DefinitionMonikersCursor,
    ) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        for moniker in &cursor.monikers {
            if moniker.kind != MONIKER_KIND_IMPORT {
                continue;
            }

            let (locations, count) = self.engine.lookup_moniker(
                self.deadline,
                cursor.dump_id,
                &cursor.path,
                moniker,
                MonikerTable::Reference,
                Some(cursor.skip_results),
                Some(limit),
            )?;

            if locations.is_empty() {
                continue;
            }

            let page_len = locations.len();
            let resolved = self.engine.resolve_locations(self.deadline, locations)?;

            let next = if cursor.skip_results + page_len < count {
                Some(Cursor::DefinitionMonikers(DefinitionMonikersCursor {
                    skip_results: cursor.skip_results + page_len,
                    ..cursor.clone()
                }))
            } else {
                None
            };

            return Ok((resolved, next));
        }

        Ok((Vec::new(), None))
    }

    /// Phases 3 and 4: drain candidate dumps that import the package, one
    /// batch window at a time. The origin dump is skipped; its results were
    /// produced by phase 1.
    fn remote_references(
        &self,
        limit: usize,
        cursor: &RemoteReferencesCursor,
        scope: RemoteScope,
    ) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        let mut cursor = cursor.clone();

        if cursor.dump_ids.is_empty() {
            let (refs, new_offset, total) = self.gather_remote_candidates(&cursor, scope)?;
            cursor.dump_ids = refs.iter().map(|reference| reference.dump_id).collect();
            cursor.skip_dumps_when_batching = new_offset;
            cursor.total_dumps_when_batching = total;
        }

        for (index, &batch_dump_id) in cursor.dump_ids.iter().enumerate() {
            if index < cursor.skip_dumps_in_batch {
                continue;
            }
            if batch_dump_id == cursor.dump_id {
                continue;
            }

            let Some(dump) = self.engine.dump_for_upload(self.deadline, batch_dump_id)? else {
                continue;
            };

            let (results, count) = self.engine.bundles().moniker_results(
                self.deadline,
                dump.id,
                MonikerTable::Reference,
                &cursor.scheme,
                &cursor.identifier,
                Some(cursor.skip_results_in_dump),
                Some(limit),
            )?;

            if results.is_empty() {
                continue;
            }

            let new_result_offset = cursor.skip_results_in_dump + results.len();
            let more_dumps = index + 1 < cursor.dump_ids.len();
            let resolved = resolve_locations_in_dump(&dump, results);

            // Continuation priority: finish this dump, then the rest of the
            // batch, then refill the batch window; otherwise the phase is
            // exhausted.
            let next = if new_result_offset < count {
                Some(RemoteReferencesCursor {
                    skip_results_in_dump: new_result_offset,
                    ..cursor.clone()
                })
            } else if more_dumps {
                Some(RemoteReferencesCursor {
                    skip_dumps_in_batch: index + 1,
                    skip_results_in_dump: 0,
                    ..cursor.clone()
                })
            } else if cursor.skip_dumps_when_batching < cursor.total_dumps_when_batching {
                Some(RemoteReferencesCursor {
                    dump_ids: Vec::new(),
                    skip_dumps_in_batch: 0,
                    skip_results_in_dump: 0,
                    ..cursor.clone()
                })
            } else {
                None
            };

            let next = next.map(|continuation| match scope {
                RemoteScope::SameRepo => Cursor::SameRepo(continuation),
                RemoteScope::RemoteRepo => Cursor::RemoteRepo(continuation),
            });

            return Ok((resolved, next));
        }

        Ok((Vec::new(), None))
    }

    /// Fill one batch window of candidate dumps, pre-filtered by each
    /// candidate's reference filter. Filtered-out rows still advance the
    /// scan offset so pagination over the full listing makes progress.
    fn gather_remote_candidates(
        &self,
        cursor: &RemoteReferencesCursor,
        scope: RemoteScope,
    ) -> Result<(Vec<PackageReference>, usize, usize)> {
        self.deadline.check()?;
        let store = self.engine.store();

        let (total, visible_ids) = match scope {
            RemoteScope::SameRepo => {
                let visible_ids = store.get_visible_ids(self.repository_id, &self.commit)?;
                let total = store.count_same_repo_package_refs(
                    &cursor.scheme,
                    &cursor.name,
                    &cursor.version,
                    &visible_ids,
                )?;
                (total as usize, Some(visible_ids))
            }
            RemoteScope::RemoteRepo => {
                let total = store.count_package_refs(
                    &cursor.scheme,
                    &cursor.name,
                    &cursor.version,
                    self.repository_id,
                )?;
                (total as usize, None)
            }
        };

        let mut refs: Vec<PackageReference> = Vec::new();
        let mut new_offset = cursor.skip_dumps_when_batching;

        while refs.len() < self.remote_dump_limit && new_offset < total {
            self.deadline.check()?;
            let page = match &visible_ids {
                Some(visible_ids) => store.get_same_repo_package_refs(
                    &cursor.scheme,
                    &cursor.name,
                    &cursor.version,
                    visible_ids,
                    self.remote_dump_limit,
                    new_offset,
                )?,
                None => store.get_package_refs(
                    &cursor.scheme,
                    &cursor.name,
                    &cursor.version,
                    self.repository_id,
                    self.remote_dump_limit,
                    new_offset,
                )?,
            };

            if page.is_empty() {
                // The count said more rows exist; guard against looping
                // forever if the listing raced a deletion.
                break;
            }

            let (accepted, scanned) =
                apply_bloom_filter(page, &cursor.identifier, self.remote_dump_limit - refs.len());
            refs.extend(accepted);
            new_offset += scanned;
        }

        Ok((refs, new_offset, total))
    }
}

impl Engine {
    /// One page of references at a position. Without a cursor the page
    /// starts from the position itself; with one it resumes the recorded
    /// phase. Returns resolved locations and the cursor to continue from,
    /// absent when the result set is exhausted.
    #[allow(clippy::too_many_arguments)]
    pub fn references(
        &self,
        deadline: Deadline,
        repository_id: i64,
        commit: &str,
        limit: usize,
        upload_id: i64,
        file: &str,
        line: i64,
        character: i64,
        cursor: Option<Cursor>,
    ) -> Result<(Vec<ResolvedLocation>, Option<Cursor>)> {
        let cursor = match cursor {
            Some(cursor) => cursor,
            None => self.make_reference_cursor(deadline, upload_id, file, line, character)?,
        };

        let resolver =
            ReferencePageResolver::new(self, deadline, repository_id, commit.to_string(), limit);
        resolver.resolve_page(cursor)
    }
}
