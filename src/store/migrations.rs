use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 3;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Uploads and dumps share this table; a dump is a row whose state
        -- is 'completed'. root is ''-or-'/'-terminated.
        CREATE TABLE IF NOT EXISTS lsif_uploads (
            id INTEGER PRIMARY KEY,
            repository_id INTEGER NOT NULL,
            "commit" TEXT NOT NULL,
            root TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT 'queued',
            visible_at_tip INTEGER NOT NULL DEFAULT 0,
            indexer TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER,
            failure_summary TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_uploads_repo_commit
            ON lsif_uploads(repository_id, "commit");
        CREATE INDEX IF NOT EXISTS idx_uploads_state ON lsif_uploads(state);
        CREATE INDEX IF NOT EXISTS idx_uploads_visible
            ON lsif_uploads(visible_at_tip);

        -- One row per (commit, parent) link; merge commits contribute a row
        -- per parent, root commits a single row with a NULL parent.
        CREATE TABLE IF NOT EXISTS lsif_commits (
            id INTEGER PRIMARY KEY,
            repository_id INTEGER NOT NULL,
            "commit" TEXT NOT NULL,
            parent_commit TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_commits_repo_commit
            ON lsif_commits(repository_id, "commit");
        CREATE INDEX IF NOT EXISTS idx_commits_repo_parent
            ON lsif_commits(repository_id, parent_commit);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_commits_unique
            ON lsif_commits(repository_id, "commit", parent_commit);

        -- The package index: which dump authoritatively defines a package.
        CREATE TABLE IF NOT EXISTS lsif_packages (
            id INTEGER PRIMARY KEY,
            scheme TEXT NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            dump_id INTEGER NOT NULL,
            UNIQUE(scheme, name, version, dump_id)
        );

        CREATE INDEX IF NOT EXISTS idx_packages_lookup
            ON lsif_packages(scheme, name, version);

        -- The reference index: which dumps import a package, with a compact
        -- membership filter over the identifiers each dump references.
        CREATE TABLE IF NOT EXISTS lsif_references (
            id INTEGER PRIMARY KEY,
            scheme TEXT NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            dump_id INTEGER NOT NULL,
            filter BLOB NOT NULL,
            UNIQUE(scheme, name, version, dump_id)
        );

        CREATE INDEX IF NOT EXISTS idx_references_lookup
            ON lsif_references(scheme, name, version);
        COMMIT;
        "#,
    )?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if current.as_deref() != Some(&SCHEMA_VERSION.to_string()) {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}
