//! Which dumps can answer queries for a path?
//!
//! Visibility narrows the candidates to the closest dumps covering the
//! path; a bundle `exists` probe then confirms the dump actually indexed
//! the file. Probes fan out over a bounded pool of scoped threads and the
//! candidate order (closest first) is preserved in the result.

use std::thread;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::Dump;
use crate::util;

impl Engine {
    pub fn find_closest_dumps(
        &self,
        deadline: Deadline,
        repository_id: i64,
        commit: &str,
        file: &str,
    ) -> Result<Vec<Dump>> {
        deadline.check()?;
        let candidates = self.store().find_closest_dumps(repository_id, commit, file)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let concurrency = Config::get().exists_concurrency.max(1);
        let mut confirmed = Vec::new();

        for chunk in candidates.chunks(concurrency) {
            deadline.check()?;
            let outcomes: Vec<Result<bool>> = thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|dump| {
                        let path_in_dump = util::path_relative_to_root(&dump.root, file);
                        let dump_id = dump.id;
                        scope.spawn(move || {
                            self.bundles().exists(deadline, dump_id, &path_in_dump)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(Error::BundleUnavailable(
                                "exists probe thread panicked".to_string(),
                            ))
                        })
                    })
                    .collect()
            });

            for (dump, outcome) in chunk.iter().zip(outcomes) {
                if outcome? {
                    confirmed.push(dump.clone());
                }
            }
        }

        Ok(confirmed)
    }
}
