//! Attaching dump metadata to bundle-local locations.

use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::Result;
use crate::model::{ApiLocation, Dump, Location, ResolvedLocation};

/// Single-dump shortcut: every location is known to come from `dump`, so no
/// store round-trip is needed.
pub fn resolve_locations_in_dump(dump: &Dump, locations: Vec<Location>) -> Vec<ResolvedLocation> {
    locations
        .into_iter()
        .map(|location| ResolvedLocation {
            dump: dump.clone(),
            path: format!("{}{}", dump.root, location.path),
            range: location.range,
        })
        .collect()
}

impl Engine {
    /// Resolve locations spanning several dumps with one batched dump
    /// fetch. Input order and cardinality are preserved, except that a
    /// location whose dump has been deleted since it was found is dropped
    /// with a warning.
    pub(crate) fn resolve_locations(
        &self,
        deadline: Deadline,
        locations: Vec<Location>,
    ) -> Result<Vec<ResolvedLocation>> {
        deadline.check()?;

        let mut ids: Vec<i64> = locations.iter().map(|location| location.dump_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let dumps_by_id = self.store().get_dumps(&ids)?;

        let mut resolved = Vec::with_capacity(locations.len());
        for location in locations {
            match dumps_by_id.get(&location.dump_id) {
                Some(dump) => resolved.push(ResolvedLocation {
                    dump: dump.clone(),
                    path: format!("{}{}", dump.root, location.path),
                    range: location.range,
                }),
                None => {
                    eprintln!(
                        "lsifq: Warning: dropping location for deleted dump {}",
                        location.dump_id
                    );
                }
            }
        }

        Ok(resolved)
    }
}

/// Project resolved locations into the wire shape.
pub fn api_locations(resolved: Vec<ResolvedLocation>) -> Vec<ApiLocation> {
    resolved.into_iter().map(ApiLocation::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, Range, STATE_COMPLETED};

    fn dump(id: i64, root: &str) -> Dump {
        Dump {
            id,
            repository_id: 42,
            commit: "c0".to_string(),
            root: root.to_string(),
            visible_at_tip: true,
            state: STATE_COMPLETED.to_string(),
            indexer: "lsif-go".to_string(),
            uploaded_at: 1,
            started_at: None,
            finished_at: None,
            failure_summary: None,
        }
    }

    fn location(dump_id: i64, path: &str) -> Location {
        Location {
            dump_id,
            path: path.to_string(),
            range: Range {
                start: Position { line: 1, character: 2 },
                end: Position { line: 1, character: 5 },
            },
        }
    }

    #[test]
    fn single_dump_shortcut_prefixes_root() {
        let dump = dump(7, "svc/");
        let resolved = resolve_locations_in_dump(&dump, vec![location(7, "a.go")]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].path, "svc/a.go");
        assert_eq!(resolved[0].dump.id, 7);
    }

    #[test]
    fn api_projection_carries_repository_and_commit() {
        let dump = dump(7, "svc/");
        let resolved = resolve_locations_in_dump(&dump, vec![location(7, "a.go")]);
        let api = api_locations(resolved);
        assert_eq!(api[0].repository_id, 42);
        assert_eq!(api[0].commit, "c0");
        assert_eq!(api[0].path, "svc/a.go");
    }
}
