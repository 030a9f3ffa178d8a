use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, Transaction};
use serde_json::Value;

use super::{RemoteError, RemoteRow, RemoteStore, RowKey};

pub const ACTIVITIES_TABLE: &str = "activities";

const KEYED_TABLES: [&str; 4] = ["lessons", "lesson_plans", "half_terms", "lesson_standards"];

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id TEXT NOT NULL,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    lesson_number TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (class_id, name, category, lesson_number)
);

CREATE TABLE IF NOT EXISTS lessons (
    id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    data TEXT NOT NULL,
    lesson_numbers TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, class_id)
);

CREATE TABLE IF NOT EXISTS lesson_plans (
    id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    data TEXT NOT NULL,
    lesson_numbers TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, class_id)
);

CREATE TABLE IF NOT EXISTS half_terms (
    id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    data TEXT NOT NULL,
    lesson_numbers TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, class_id)
);

CREATE TABLE IF NOT EXISTS lesson_standards (
    id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    data TEXT NOT NULL,
    lesson_numbers TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, class_id)
);
"#;

/// Relational remote backed by a SQLite file, typically on shared storage.
pub struct SqliteRemote {
    conn: Connection,
    location: String,
}

impl SqliteRemote {
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, RemoteError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    fn ensure_known(table: &str) -> Result<(), RemoteError> {
        if table == ACTIVITIES_TABLE || KEYED_TABLES.contains(&table) {
            Ok(())
        } else {
            Err(RemoteError::Schema(format!("unknown table '{}'", table)))
        }
    }

    fn write_rows(
        tx: &Transaction<'_>,
        table: &str,
        class_id: &str,
        rows: &[RemoteRow],
        now: &str,
    ) -> Result<(), RemoteError> {
        for row in rows {
            let data = serde_json::to_string(&row.data)?;
            match &row.key {
                RowKey::Activity {
                    name,
                    category,
                    lesson_number,
                } if table == ACTIVITIES_TABLE => {
                    tx.execute(
                        r#"
INSERT INTO activities (class_id, name, category, lesson_number, data, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(class_id, name, category, lesson_number) DO UPDATE SET
    data = excluded.data,
    updated_at = excluded.updated_at
"#,
                        params![class_id, name, category, lesson_number, data, now],
                    )?;
                }
                RowKey::Id(id) if table != ACTIVITIES_TABLE => {
                    let index = serde_json::to_string(&row.lesson_numbers)?;
                    tx.execute(
                        &format!(
                            r#"
INSERT INTO {table} (id, class_id, data, lesson_numbers, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(id, class_id) DO UPDATE SET
    data = excluded.data,
    lesson_numbers = excluded.lesson_numbers,
    updated_at = excluded.updated_at
"#
                        ),
                        params![id, class_id, data, index, now],
                    )?;
                }
                other => {
                    return Err(RemoteError::Schema(format!(
                        "row key {:?} does not fit table '{}'",
                        other, table
                    )));
                }
            }
        }
        Ok(())
    }

    fn delete_missing(
        tx: &Transaction<'_>,
        table: &str,
        class_id: &str,
        rows: &[RemoteRow],
    ) -> Result<usize, RemoteError> {
        let mut deleted = 0;
        if table == ACTIVITIES_TABLE {
            let mut stmt = tx.prepare(
                "SELECT id, name, category, lesson_number FROM activities WHERE class_id = ?1",
            )?;
            let stale: Vec<i64> = stmt
                .query_map(params![class_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        RowKey::Activity {
                            name: row.get(1)?,
                            category: row.get(2)?,
                            lesson_number: row.get(3)?,
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|(_, key)| rows.iter().all(|row| &row.key != key))
                .map(|(id, _)| id)
                .collect();
            for id in stale {
                deleted += tx.execute("DELETE FROM activities WHERE id = ?1", params![id])?;
            }
        } else {
            let mut stmt = tx.prepare(&format!("SELECT id FROM {table} WHERE class_id = ?1"))?;
            let stale: Vec<String> = stmt
                .query_map(params![class_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|id| rows.iter().all(|row| row.key != RowKey::Id(id.clone())))
                .collect();
            for id in stale {
                deleted += tx.execute(
                    &format!("DELETE FROM {table} WHERE id = ?1 AND class_id = ?2"),
                    params![id, class_id],
                )?;
            }
        }
        Ok(deleted)
    }
}

impl RemoteStore for SqliteRemote {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }

    fn fetch(&self, table: &str, class_id: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        Self::ensure_known(table)?;
        let mut out = Vec::new();
        if table == ACTIVITIES_TABLE {
            let mut stmt = self.conn.prepare(
                r#"
SELECT id, name, category, lesson_number, data
FROM activities
WHERE class_id = ?1
ORDER BY id ASC
"#,
            )?;
            let mut rows = stmt.query(params![class_id])?;
            while let Some(row) = rows.next()? {
                let data: String = row.get(4)?;
                out.push(RemoteRow {
                    key: RowKey::Activity {
                        name: row.get(1)?,
                        category: row.get(2)?,
                        lesson_number: row.get(3)?,
                    },
                    data: serde_json::from_str::<Value>(&data)?,
                    lesson_numbers: Vec::new(),
                    remote_id: Some(row.get::<_, i64>(0)?.to_string()),
                });
            }
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT id, data, lesson_numbers FROM {table} WHERE class_id = ?1 ORDER BY rowid ASC"
            ))?;
            let mut rows = stmt.query(params![class_id])?;
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let data: String = row.get(1)?;
                let index: String = row.get(2)?;
                out.push(RemoteRow {
                    key: RowKey::Id(id.clone()),
                    data: serde_json::from_str::<Value>(&data)?,
                    lesson_numbers: serde_json::from_str(&index)?,
                    remote_id: Some(id),
                });
            }
        }
        Ok(out)
    }

    fn upsert(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        Self::ensure_known(table)?;
        let now = crate::engine::now_utc_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        Self::write_rows(&tx, table, class_id, rows, &now)?;
        tx.commit()?;
        Ok(())
    }

    fn replace(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        Self::ensure_known(table)?;
        let now = crate::engine::now_utc_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        Self::write_rows(&tx, table, class_id, rows, &now)?;
        let deleted = Self::delete_missing(&tx, table, class_id, rows)?;
        tx.commit()?;
        tracing::debug!(table, class = class_id, rows = rows.len(), deleted, "remote replace");
        Ok(())
    }
}
