use rusqlite::{params, Connection, OptionalExtension};

use crate::engine::now_utc_rfc3339;

use super::errors::ImportError;

pub fn fingerprint_exists(conn: &Connection, token: &str) -> Result<bool, ImportError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT fingerprint FROM import_fingerprints WHERE fingerprint = ?1",
            params![token],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn insert_fingerprint(
    conn: &Connection,
    token: &str,
    class_id: &str,
    source_key: &str,
    row_key: &str,
) -> Result<(), ImportError> {
    conn.execute(
        concat!(
            "INSERT OR IGNORE INTO import_fingerprints ",
            "(fingerprint, class_id, source_key, row_key, created_at) ",
            "VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![token, class_id, source_key, row_key, now_utc_rfc3339()],
    )?;
    Ok(())
}
