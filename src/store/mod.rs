use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Dump, PackageReference, Upload, STATE_COMPLETED, STATE_QUEUED};
use crate::visibility;
use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod migrations;

const DUMP_COLUMNS: &str = "u.id, u.repository_id, u.\"commit\", u.root, u.visible_at_tip, \
     u.state, u.indexer, u.uploaded_at, u.started_at, u.finished_at, u.failure_summary";

/// A dump correlated to a lineage commit, as the visibility engine
/// consumes it.
#[derive(Debug, Clone)]
pub struct DumpCandidate {
    pub dump_id: i64,
    pub root: String,
    pub indexer: String,
}

/// Insertable upload row. The converter that produces dumps lives outside
/// this service; this shape exists for it and for test fixtures.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub repository_id: i64,
    pub commit: String,
    pub root: String,
    pub state: String,
    pub visible_at_tip: bool,
    pub indexer: String,
    pub uploaded_at: i64,
}

/// Filters for upload listings.
#[derive(Debug, Clone, Default)]
pub struct UploadQuery {
    pub term: Option<String>,
    pub state: Option<String>,
    pub visible_at_tip: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

pub struct Store {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Store {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }

        let config = Config::get();

        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a read query against the pool. Busy/locked errors are transient
    /// and get exactly one retry with jitter before surfacing as
    /// `StoreUnavailable`.
    fn read<T>(&self, f: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.read_pool.get()?;
        match f(&conn) {
            Ok(value) => Ok(value),
            Err(err) if is_transient(&err) => {
                drop(conn);
                eprintln!("lsifq: transient store error, retrying once: {err}");
                std::thread::sleep(retry_jitter());
                let conn = self.read_pool.get()?;
                f(&conn).map_err(Error::from)
            }
            Err(err) => Err(Error::from(err)),
        }
    }

    /// Run a statement on the write connection, with the same single-retry
    /// policy as reads.
    fn write<T>(&self, f: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.write_conn.lock().unwrap();
        match f(&conn) {
            Ok(value) => Ok(value),
            Err(err) if is_transient(&err) => {
                eprintln!("lsifq: transient store error, retrying once: {err}");
                std::thread::sleep(retry_jitter());
                f(&conn).map_err(Error::from)
            }
            Err(err) => Err(Error::from(err)),
        }
    }

    // -----------------------------------------------------------------
    // Dumps
    // -----------------------------------------------------------------

    /// Fetch one completed dump by primary key.
    pub fn get_dump_by_id(&self, id: i64) -> Result<Option<Dump>> {
        self.read(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {DUMP_COLUMNS} FROM lsif_uploads u
                     WHERE u.id = ? AND u.state = 'completed'"
                ),
                params![id],
                dump_from_row,
            )
            .optional()
        })
    }

    /// Batched dump lookup; the location resolver's sole bulk interface.
    pub fn get_dumps(&self, ids: &[i64]) -> Result<HashMap<i64, Dump>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!(
            "SELECT {DUMP_COLUMNS} FROM lsif_uploads u
             WHERE u.state = 'completed' AND u.id IN ({placeholders})"
        );
        self.read(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), dump_from_row)?;
            let mut dumps = HashMap::new();
            for row in rows {
                let dump = row?;
                dumps.insert(dump.id, dump);
            }
            Ok(dumps)
        })
    }

    pub fn insert_upload(&self, record: &UploadRecord) -> Result<i64> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO lsif_uploads
                     (repository_id, \"commit\", root, state, visible_at_tip, indexer, uploaded_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.repository_id,
                    record.commit,
                    record.root,
                    record.state,
                    record.visible_at_tip,
                    record.indexer,
                    record.uploaded_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch one upload in any state, with its place in the processing
    /// queue when still queued.
    pub fn get_upload_by_id(&self, id: i64) -> Result<Option<Upload>> {
        self.read(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {DUMP_COLUMNS}, s.rank
                     FROM lsif_uploads u
                     LEFT JOIN (
                         SELECT r.id, RANK() OVER (ORDER BY r.uploaded_at, r.id) AS rank
                         FROM lsif_uploads r
                         WHERE r.state = ?
                     ) s ON u.id = s.id
                     WHERE u.id = ?"
                ),
                params![STATE_QUEUED, id],
                upload_from_row,
            )
            .optional()
        })
    }

    /// List a repository's uploads, newest first, with a real total count.
    pub fn list_uploads(
        &self,
        repository_id: i64,
        query: &UploadQuery,
    ) -> Result<(Vec<Upload>, i64)> {
        let mut conds = vec!["u.repository_id = ?".to_string()];
        let mut args: Vec<rusqlite::types::Value> = vec![repository_id.into()];

        if let Some(state) = &query.state {
            conds.push("u.state = ?".to_string());
            args.push(state.clone().into());
        }
        if let Some(term) = &query.term {
            conds.push(
                "(u.\"commit\" LIKE ? OR u.root LIKE ? OR u.indexer LIKE ? \
                  OR u.failure_summary LIKE ?)"
                    .to_string(),
            );
            let pattern = format!("%{term}%");
            for _ in 0..4 {
                args.push(pattern.clone().into());
            }
        }
        if query.visible_at_tip {
            conds.push("u.visible_at_tip = 1".to_string());
        }

        let where_clause = conds.join(" AND ");
        let limit = query.limit.unwrap_or(Config::get().upload_page_size);
        let offset = query.offset;

        self.read(move |conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM lsif_uploads u WHERE {where_clause}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {DUMP_COLUMNS}, s.rank
                 FROM lsif_uploads u
                 LEFT JOIN (
                     SELECT r.id, RANK() OVER (ORDER BY r.uploaded_at, r.id) AS rank
                     FROM lsif_uploads r
                     WHERE r.state = 'queued'
                 ) s ON u.id = s.id
                 WHERE {where_clause}
                 ORDER BY u.uploaded_at DESC, u.id DESC
                 LIMIT {limit} OFFSET {offset}"
            ))?;
            let rows = stmt.query_map(params_from_iter(args.iter()), upload_from_row)?;
            let mut uploads = Vec::new();
            for row in rows {
                uploads.push(row?);
            }
            Ok((uploads, total))
        })
    }

    /// Delete an upload, reporting (repository id, was visible at tip) so
    /// the caller can recompute tip visibility for visible dumps.
    pub fn delete_upload(&self, id: i64) -> Result<Option<(i64, bool)>> {
        self.write(|conn| {
            conn.query_row(
                "DELETE FROM lsif_uploads WHERE id = ?
                 RETURNING repository_id, visible_at_tip",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
    }

    /// Recompute `visible_at_tip` for a repository from the visibility set
    /// at the tip commit: unset every previously visible dump that fell out
    /// of the set, set every dump now in it.
    pub fn update_tip_visibility(&self, repository_id: i64, tip_commit: &str) -> Result<()> {
        let visible = self.get_visible_ids(repository_id, tip_commit)?;
        let placeholders = if visible.is_empty() {
            "-1".to_string()
        } else {
            vec!["?"; visible.len()].join(", ")
        };
        let query = format!(
            "UPDATE lsif_uploads
             SET visible_at_tip = id IN ({placeholders})
             WHERE repository_id = ? AND (visible_at_tip OR id IN ({placeholders}))"
        );
        self.write(move |conn| {
            let mut args: Vec<rusqlite::types::Value> = Vec::new();
            for id in &visible {
                args.push((*id).into());
            }
            args.push(repository_id.into());
            for id in &visible {
                args.push((*id).into());
            }
            conn.execute(&query, params_from_iter(args.iter()))?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Commit DAG
    // -----------------------------------------------------------------

    /// Record commit/parent links. Merge commits pass one pair per parent;
    /// root commits pass a None parent. Duplicates are ignored.
    pub fn insert_commits(
        &self,
        repository_id: i64,
        links: &[(String, Option<String>)],
    ) -> Result<()> {
        self.write(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO lsif_commits (repository_id, \"commit\", parent_commit)
                 VALUES (?, ?, ?)",
            )?;
            for (commit, parent) in links {
                stmt.execute(params![repository_id, commit, parent])?;
            }
            Ok(())
        })
    }

    pub fn has_commit(&self, repository_id: i64, commit: &str) -> Result<bool> {
        self.read(|conn| {
            conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM lsif_commits
                     WHERE repository_id = ? AND \"commit\" = ?
                 )",
                params![repository_id, commit],
                |row| row.get(0),
            )
        })
    }

    /// Parents of `commit` that are themselves present in the DAG, in a
    /// stable order so lineage traversal is deterministic.
    pub fn parents_of(&self, repository_id: i64, commit: &str) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT c.\"commit\"
                 FROM lsif_commits p
                 JOIN lsif_commits c
                   ON c.repository_id = p.repository_id AND c.\"commit\" = p.parent_commit
                 WHERE p.repository_id = ? AND p.\"commit\" = ?
                 ORDER BY c.\"commit\"",
            )?;
            let rows = stmt.query_map(params![repository_id, commit], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Children of `commit`, in a stable order.
    pub fn children_of(&self, repository_id: i64, commit: &str) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT \"commit\" FROM lsif_commits
                 WHERE repository_id = ? AND parent_commit = ?
                 ORDER BY \"commit\"",
            )?;
            let rows = stmt.query_map(params![repository_id, commit], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Completed dumps recorded on one (repository, commit).
    pub fn dumps_for_commit(
        &self,
        repository_id: i64,
        commit: &str,
    ) -> Result<Vec<DumpCandidate>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, root, indexer FROM lsif_uploads
                 WHERE repository_id = ? AND \"commit\" = ? AND state = ?
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![repository_id, commit, STATE_COMPLETED], |row| {
                Ok(DumpCandidate {
                    dump_id: row.get(0)?,
                    root: row.get(1)?,
                    indexer: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    // -----------------------------------------------------------------
    // Visibility wrappers
    // -----------------------------------------------------------------

    /// Dump ids visible from `commit` under the shadowing rule.
    pub fn get_visible_ids(&self, repository_id: i64, commit: &str) -> Result<Vec<i64>> {
        visibility::get_visible_ids(self, repository_id, commit)
    }

    /// Visible dumps whose root covers `file`, closest first.
    pub fn find_closest_dumps(
        &self,
        repository_id: i64,
        commit: &str,
        file: &str,
    ) -> Result<Vec<Dump>> {
        visibility::find_closest_dumps(self, repository_id, commit, file)
    }

    // -----------------------------------------------------------------
    // Package index
    // -----------------------------------------------------------------

    pub fn insert_package(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        dump_id: i64,
    ) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO lsif_packages (scheme, name, version, dump_id)
                 VALUES (?, ?, ?, ?)",
                params![scheme, name, version, dump_id],
            )?;
            Ok(())
        })
    }

    /// The dump that authoritatively defines a package. Should multiple
    /// dumps claim the same package, the lowest dump id wins so the answer
    /// is deterministic.
    pub fn get_package(&self, scheme: &str, name: &str, version: &str) -> Result<Option<Dump>> {
        self.read(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {DUMP_COLUMNS}
                     FROM lsif_packages p
                     JOIN lsif_uploads u ON p.dump_id = u.id
                     WHERE p.scheme = ? AND p.name = ? AND p.version = ?
                       AND u.state = 'completed'
                     ORDER BY p.dump_id
                     LIMIT 1"
                ),
                params![scheme, name, version],
                dump_from_row,
            )
            .optional()
        })
    }

    // -----------------------------------------------------------------
    // Reference index
    // -----------------------------------------------------------------

    pub fn insert_reference(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        dump_id: i64,
        filter: &[u8],
    ) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO lsif_references (scheme, name, version, dump_id, filter)
                 VALUES (?, ?, ?, ?, ?)",
                params![scheme, name, version, dump_id, filter],
            )?;
            Ok(())
        })
    }

    /// Count dumps in other repositories, visible at their tip, that import
    /// the package.
    pub fn count_package_refs(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        excluding_repository_id: i64,
    ) -> Result<i64> {
        self.read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM lsif_references r
                 JOIN lsif_uploads u ON r.dump_id = u.id
                 WHERE r.scheme = ? AND r.name = ? AND r.version = ?
                   AND u.repository_id != ? AND u.visible_at_tip AND u.state = 'completed'",
                params![scheme, name, version, excluding_repository_id],
                |row| row.get(0),
            )
        })
    }

    /// Page of cross-repository reference candidates, ordered by
    /// (repository id, root) for stable pagination.
    pub fn get_package_refs(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        excluding_repository_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PackageReference>> {
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, r.filter FROM lsif_references r
                 JOIN lsif_uploads u ON r.dump_id = u.id
                 WHERE r.scheme = ? AND r.name = ? AND r.version = ?
                   AND u.repository_id != ? AND u.visible_at_tip AND u.state = 'completed'
                 ORDER BY u.repository_id, u.root
                 LIMIT ? OFFSET ?",
            )?;
            let rows = stmt.query_map(
                params![
                    scheme,
                    name,
                    version,
                    excluding_repository_id,
                    limit as i64,
                    offset as i64
                ],
                reference_from_row,
            )?;
            rows.collect()
        })
    }

    /// Count same-repository reference candidates among the dumps visible
    /// at the query commit.
    pub fn count_same_repo_package_refs(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        visible_ids: &[i64],
    ) -> Result<i64> {
        if visible_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; visible_ids.len()].join(", ");
        let query = format!(
            "SELECT COUNT(*) FROM lsif_references r
             WHERE r.scheme = ? AND r.name = ? AND r.version = ?
               AND r.dump_id IN ({placeholders})"
        );
        self.read(move |conn| {
            let mut args: Vec<rusqlite::types::Value> = vec![
                scheme.to_string().into(),
                name.to_string().into(),
                version.to_string().into(),
            ];
            for id in visible_ids {
                args.push((*id).into());
            }
            conn.query_row(&query, params_from_iter(args.iter()), |row| row.get(0))
        })
    }

    /// Page of same-repository reference candidates, ordered by root.
    pub fn get_same_repo_package_refs(
        &self,
        scheme: &str,
        name: &str,
        version: &str,
        visible_ids: &[i64],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PackageReference>> {
        if visible_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; visible_ids.len()].join(", ");
        let query = format!(
            "SELECT u.id, r.filter FROM lsif_references r
             JOIN lsif_uploads u ON r.dump_id = u.id
             WHERE r.scheme = ? AND r.name = ? AND r.version = ?
               AND r.dump_id IN ({placeholders})
             ORDER BY u.root, u.id
             LIMIT ? OFFSET ?",
        );
        self.read(move |conn| {
            let mut args: Vec<rusqlite::types::Value> = vec![
                scheme.to_string().into(),
                name.to_string().into(),
                version.to_string().into(),
            ];
            for id in visible_ids {
                args.push((*id).into());
            }
            args.push((limit as i64).into());
            args.push((offset as i64).into());
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), reference_from_row)?;
            rows.collect()
        })
    }
}

fn dump_from_row(row: &Row) -> rusqlite::Result<Dump> {
    Ok(Dump {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        commit: row.get(2)?,
        root: row.get(3)?,
        visible_at_tip: row.get(4)?,
        state: row.get(5)?,
        indexer: row.get(6)?,
        uploaded_at: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
        failure_summary: row.get(10)?,
    })
}

fn upload_from_row(row: &Row) -> rusqlite::Result<Upload> {
    Ok(Upload {
        dump: dump_from_row(row)?,
        place_in_queue: row.get(11)?,
    })
}

fn reference_from_row(row: &Row) -> rusqlite::Result<PackageReference> {
    Ok(PackageReference {
        dump_id: row.get(0)?,
        filter: row.get(1)?,
    })
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Small randomized backoff before the single retry, so two colliding
/// requests do not collide again.
fn retry_jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    Duration::from_millis(10 + nanos % 40)
}
