use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};

use crate::engine::now_utc_rfc3339;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_cache_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_blob (
    key TEXT PRIMARY KEY,
    class_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    value TEXT NOT NULL,
    bytes INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_status (
    class_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    state TEXT NOT NULL,
    last_error TEXT,
    last_attempt_at TEXT NOT NULL,
    last_synced_at TEXT,
    PRIMARY KEY (class_id, collection)
);

CREATE INDEX IF NOT EXISTS idx_cache_blob_class ON cache_blob(class_id);
"#,
    },
    Migration {
        version: 2,
        name: "import_tracking_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS import_state (
    source_key TEXT PRIMARY KEY,
    class_id TEXT NOT NULL,
    source_ref TEXT NOT NULL,
    last_run_at TEXT NOT NULL,
    last_status TEXT NOT NULL,
    processed_count INTEGER NOT NULL DEFAULT 0,
    imported_count INTEGER NOT NULL DEFAULT 0,
    skipped_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE TABLE IF NOT EXISTS import_fingerprints (
    fingerprint TEXT PRIMARY KEY,
    class_id TEXT NOT NULL,
    source_key TEXT NOT NULL,
    row_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_import_fingerprints_class
    ON import_fingerprints(class_id);
"#,
    },
];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

pub fn get_blob(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM cache_blob WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub struct PutBlob<'a> {
    pub key: &'a str,
    pub class_id: &'a str,
    pub collection: &'a str,
    pub value: &'a str,
}

pub fn put_blob(conn: &Connection, args: &PutBlob<'_>) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO cache_blob (key, class_id, collection, value, bytes, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value,
    bytes = excluded.bytes,
    updated_at = excluded.updated_at
"#,
        params![
            args.key,
            args.class_id,
            args.collection,
            args.value,
            args.value.len() as i64,
            now_utc_rfc3339()
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn list_blob_keys(conn: &Connection, class_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT key FROM cache_blob WHERE class_id = ?1 ORDER BY key ASC")?;
    let rows = stmt.query_map(params![class_id], |row| row.get(0))?;
    rows.collect()
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SyncStatusRecord {
    pub class_id: String,
    pub collection: String,
    pub state: String,
    pub last_error: Option<String>,
    pub last_attempt_at: String,
    pub last_synced_at: Option<String>,
}

pub fn record_sync_status(
    conn: &Connection,
    class_id: &str,
    collection: &str,
    state: &str,
    last_error: Option<&str>,
) -> Result<()> {
    let now = now_utc_rfc3339();
    let synced_at = (state == "synced").then(|| now.clone());
    conn.execute(
        r#"
INSERT INTO sync_status (class_id, collection, state, last_error, last_attempt_at, last_synced_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(class_id, collection) DO UPDATE SET
    state = excluded.state,
    last_error = excluded.last_error,
    last_attempt_at = excluded.last_attempt_at,
    last_synced_at = COALESCE(excluded.last_synced_at, sync_status.last_synced_at)
"#,
        params![class_id, collection, state, last_error, now, synced_at],
    )?;
    Ok(())
}

pub fn list_sync_status(conn: &Connection, class_id: &str) -> Result<Vec<SyncStatusRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT class_id, collection, state, last_error, last_attempt_at, last_synced_at
FROM sync_status
WHERE class_id = ?1
ORDER BY collection ASC
"#,
    )?;

    let mut rows = stmt.query(params![class_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(SyncStatusRecord {
            class_id: row.get(0)?,
            collection: row.get(1)?,
            state: row.get(2)?,
            last_error: row.get(3)?,
            last_attempt_at: row.get(4)?,
            last_synced_at: row.get(5)?,
        });
    }

    Ok(result)
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

#[cfg(test)]
mod tests;
