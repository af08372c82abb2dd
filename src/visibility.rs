//! Dump visibility over the commit DAG.
//!
//! For a (repository, commit) pair, walk the DAG outward from the commit in
//! both directions, correlate visited commits with their dumps, and apply
//! the shadowing rule: a dump is hidden when a closer dump from the same
//! indexer covers an overlapping root. Closer dumps from a *different*
//! indexer never hide anything, so indexes for coexisting languages do not
//! fight each other.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::model::Dump;
use crate::store::Store;
use crate::util;

/// Traversal cap: lineage rows beyond this depth are never considered, which
/// both approximates graph distance on huge histories and guarantees
/// termination should the DAG ever contain a cycle.
pub const MAX_TRAVERSAL_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    Ancestor,
    Descendant,
}

/// One dump correlated to a lineage row. `n` is the row number of the
/// commit in BFS order, standing in for graph distance.
#[derive(Debug, Clone)]
pub struct LineageDump {
    pub n: usize,
    pub dump_id: i64,
    pub root: String,
    pub indexer: String,
}

/// Commits reachable from `commit` walking parents (ancestors) and children
/// (descendants), in BFS order, capped at `MAX_TRAVERSAL_LIMIT` rows. The
/// seed commit contributes one row per direction, mirroring how distance
/// zero counts against the cap for both walks. A commit missing from the
/// DAG yields no rows.
fn bidirectional_lineage(
    store: &Store,
    repository_id: i64,
    commit: &str,
) -> Result<Vec<String>> {
    if !store.has_commit(repository_id, commit)? {
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    let mut queue: VecDeque<(String, Direction)> = VecDeque::new();
    let mut seen: HashSet<(String, Direction)> = HashSet::new();

    for direction in [Direction::Ancestor, Direction::Descendant] {
        queue.push_back((commit.to_string(), direction));
        seen.insert((commit.to_string(), direction));
    }

    while let Some((current, direction)) = queue.pop_front() {
        if rows.len() >= MAX_TRAVERSAL_LIMIT {
            break;
        }
        rows.push(current.clone());

        let next = match direction {
            Direction::Ancestor => store.parents_of(repository_id, &current)?,
            Direction::Descendant => store.children_of(repository_id, &current)?,
        };
        for neighbor in next {
            if seen.insert((neighbor.clone(), direction)) {
                queue.push_back((neighbor, direction));
            }
        }
    }

    Ok(rows)
}

/// Correlate lineage commits with the dumps recorded on them. Row numbers
/// start at 1 and follow traversal order.
pub fn lineage_with_dumps(
    store: &Store,
    repository_id: i64,
    commit: &str,
) -> Result<Vec<LineageDump>> {
    let lineage = bidirectional_lineage(store, repository_id, commit)?;

    let mut candidates = Vec::new();
    for (index, lineage_commit) in lineage.iter().enumerate() {
        for dump in store.dumps_for_commit(repository_id, lineage_commit)? {
            candidates.push(LineageDump {
                n: index + 1,
                dump_id: dump.dump_id,
                root: dump.root,
                indexer: dump.indexer,
            });
        }
    }

    Ok(candidates)
}

fn roots_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// The shadowing filter. A row is shadowed when a strictly closer row from
/// the same indexer covers an overlapping root; a dump stays visible as
/// long as any of its rows survives. Equal distance never shadows.
pub fn visible_ids(candidates: &[LineageDump]) -> HashSet<i64> {
    candidates
        .iter()
        .filter(|t1| {
            !candidates.iter().any(|t2| {
                t2.n < t1.n && t2.indexer == t1.indexer && roots_overlap(&t2.root, &t1.root)
            })
        })
        .map(|dump| dump.dump_id)
        .collect()
}

/// Materialize the visible set for (repository, commit), sorted for
/// deterministic output.
pub fn get_visible_ids(store: &Store, repository_id: i64, commit: &str) -> Result<Vec<i64>> {
    let candidates = lineage_with_dumps(store, repository_id, commit)?;
    let mut ids: Vec<i64> = visible_ids(&candidates).into_iter().collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Visible dumps whose root is a prefix of `file`, ordered by lineage
/// distance ascending. A dump reachable through several DAG paths appears
/// once, at its minimum distance.
pub fn find_closest_dumps(
    store: &Store,
    repository_id: i64,
    commit: &str,
    file: &str,
) -> Result<Vec<Dump>> {
    let candidates = lineage_with_dumps(store, repository_id, commit)?;
    let visible = visible_ids(&candidates);

    let mut ordered_ids = Vec::new();
    let mut seen = HashSet::new();
    for candidate in &candidates {
        if !util::root_contains(&candidate.root, file) {
            continue;
        }
        if !visible.contains(&candidate.dump_id) {
            continue;
        }
        if seen.insert(candidate.dump_id) {
            ordered_ids.push(candidate.dump_id);
        }
    }

    let mut dumps_by_id: HashMap<i64, Dump> = store.get_dumps(&ordered_ids)?;
    let mut dumps = Vec::new();
    for id in ordered_ids {
        if let Some(dump) = dumps_by_id.remove(&id) {
            dumps.push(dump);
        }
    }

    Ok(dumps)
}
