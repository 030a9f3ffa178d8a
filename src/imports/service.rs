use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};

use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::activity::Activity;
use crate::engine::{now_utc_rfc3339, MergeSummary};

use super::errors::ImportError;
use super::source::{normalize_path, source_key, ImportRow};
use super::store::{fingerprint_exists, insert_fingerprint};

pub struct ImportService<'a> {
    conn: &'a Connection,
    class_id: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub class_id: String,
    pub source_ref: String,
    pub status: String,
    pub processed_count: u64,
    pub imported_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub dry_run: bool,
    pub last_run_at: String,
    pub merge: MergeSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportStatus {
    pub source_ref: String,
    pub status: String,
    pub processed_count: u64,
    pub imported_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_run_at: String,
}

#[derive(Debug, Clone, Default)]
struct ImportRun {
    processed_count: u64,
    imported_count: u64,
    skipped_count: u64,
    error_count: u64,
    last_error: Option<String>,
}

struct AcceptedRow {
    token: String,
    row_key: String,
    activity: Activity,
}

impl<'a> ImportService<'a> {
    pub fn new(conn: &'a Connection, class_id: &'a str) -> Self {
        Self { conn, class_id }
    }

    /// Reads `file`, hands the valid unseen rows to `apply` as one batch, and
    /// records the run. Rows are remembered by fingerprint only once `apply`
    /// succeeds; a dry run writes nothing.
    pub fn import_jsonl<F>(
        &self,
        file: &str,
        dry_run: bool,
        apply: F,
    ) -> Result<ImportSummary, ImportError>
    where
        F: FnOnce(Vec<Activity>) -> Result<MergeSummary, ImportError>,
    {
        let source_ref = normalize_path(file)?;
        let source_key = source_key(self.class_id, &source_ref);

        let handle = File::open(&source_ref)?;
        let reader = BufReader::new(handle);
        let mut run = ImportRun::default();
        let mut accepted: Vec<AcceptedRow> = Vec::new();
        let mut seen = HashSet::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let text = line?;
            if text.trim().is_empty() {
                continue;
            }

            run.processed_count += 1;
            let row: ImportRow = match serde_json::from_str(&text) {
                Ok(row) => row,
                Err(err) => {
                    run.error_count += 1;
                    run.last_error = Some(format!("line {}: invalid JSON: {}", line_number, err));
                    continue;
                }
            };

            let token = fingerprint(self.class_id, &row)?;
            if !seen.insert(token.clone()) || fingerprint_exists(self.conn, &token)? {
                run.skipped_count += 1;
                continue;
            }

            match row.into_activity() {
                Ok(activity) => {
                    let row_key = format!(
                        "{}|{}|{}",
                        activity.name,
                        activity.category,
                        activity
                            .lesson_number
                            .map(|number| number.to_string())
                            .unwrap_or_default()
                    );
                    accepted.push(AcceptedRow {
                        token,
                        row_key,
                        activity,
                    });
                }
                Err(ImportError::InvalidRecord(message)) => {
                    run.error_count += 1;
                    run.last_error = Some(format!("line {}: {}", line_number, message));
                }
                Err(err) => return Err(err),
            }
        }

        let activities: Vec<Activity> = accepted.iter().map(|row| row.activity.clone()).collect();
        let merged = if activities.is_empty() {
            Ok(MergeSummary::default())
        } else {
            apply(activities)
        };

        let merge = match merged {
            Ok(merge) => merge,
            Err(err) => {
                tracing::warn!(
                    class = self.class_id,
                    source = %source_ref,
                    error = %err,
                    "import rejected"
                );
                run.last_error = Some(err.to_string());
                if !dry_run {
                    self.record_run(&source_key, &source_ref, &run, "rejected")?;
                }
                return Err(err);
            }
        };
        run.imported_count = accepted.len() as u64;

        let status = if dry_run {
            "dry_run"
        } else if run.error_count > 0 {
            "partial"
        } else {
            "completed"
        };
        let last_run_at = if dry_run {
            now_utc_rfc3339()
        } else {
            for row in &accepted {
                insert_fingerprint(self.conn, &row.token, self.class_id, &source_key, &row.row_key)?;
            }
            self.record_run(&source_key, &source_ref, &run, status)?
        };

        tracing::info!(
            class = self.class_id,
            source = %source_ref,
            processed = run.processed_count,
            imported = run.imported_count,
            skipped = run.skipped_count,
            errors = run.error_count,
            dry_run,
            "import finished"
        );

        Ok(ImportSummary {
            class_id: self.class_id.to_string(),
            source_ref,
            status: status.to_string(),
            processed_count: run.processed_count,
            imported_count: run.imported_count,
            skipped_count: run.skipped_count,
            error_count: run.error_count,
            last_error: run.last_error,
            dry_run,
            last_run_at,
            merge,
        })
    }

    pub fn list_statuses(&self) -> Result<Vec<ImportStatus>, ImportError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT source_ref, last_status, processed_count, imported_count,
       skipped_count, error_count, last_error, last_run_at
FROM import_state
WHERE class_id = ?1
ORDER BY last_run_at DESC, source_ref ASC
"#,
        )?;
        let mut rows = stmt.query(params![self.class_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ImportStatus {
                source_ref: row.get(0)?,
                status: row.get(1)?,
                processed_count: row.get::<_, i64>(2)? as u64,
                imported_count: row.get::<_, i64>(3)? as u64,
                skipped_count: row.get::<_, i64>(4)? as u64,
                error_count: row.get::<_, i64>(5)? as u64,
                last_error: row.get(6)?,
                last_run_at: row.get(7)?,
            });
        }
        Ok(out)
    }

    fn record_run(
        &self,
        source_key: &str,
        source_ref: &str,
        run: &ImportRun,
        status: &str,
    ) -> Result<String, ImportError> {
        let last_run_at = now_utc_rfc3339();
        self.conn.execute(
            r#"
INSERT INTO import_state (
    source_key, class_id, source_ref, last_run_at, last_status,
    processed_count, imported_count, skipped_count, error_count, last_error
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(source_key) DO UPDATE SET
    last_run_at = excluded.last_run_at,
    last_status = excluded.last_status,
    processed_count = excluded.processed_count,
    imported_count = excluded.imported_count,
    skipped_count = excluded.skipped_count,
    error_count = excluded.error_count,
    last_error = excluded.last_error
"#,
            params![
                source_key,
                self.class_id,
                source_ref,
                last_run_at,
                status,
                run.processed_count as i64,
                run.imported_count as i64,
                run.skipped_count as i64,
                run.error_count as i64,
                run.last_error
            ],
        )?;
        Ok(last_run_at)
    }
}

/// Content hash of a row, scoped to the class it is imported into.
fn fingerprint(class_id: &str, row: &ImportRow) -> Result<String, ImportError> {
    let canonical = serde_json::to_string(row)?;
    let mut hasher = Sha256::new();
    hasher.update(class_id.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(out, "{:02x}", byte);
    }
    Ok(out)
}
