use std::error::Error;
use std::fmt;

use serde_json::Value;

#[cfg(test)]
pub mod memory;
mod sqlite;

pub use sqlite::SqliteRemote;

/// Upsert key of a remote row. Activities are keyed by their natural composite;
/// every other table by `(id, class_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Id(String),
    Activity {
        name: String,
        category: String,
        lesson_number: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRow {
    pub key: RowKey,
    pub data: Value,
    /// Index array column (`lesson_numbers`) kept beside the JSON payload.
    pub lesson_numbers: Vec<String>,
    /// Identifier assigned by the remote store; only set on rows read back.
    pub remote_id: Option<String>,
}

impl RemoteRow {
    pub fn new(key: RowKey, data: Value) -> Self {
        Self {
            key,
            data,
            lesson_numbers: Vec::new(),
            remote_id: None,
        }
    }

    pub fn with_lesson_numbers(mut self, numbers: Vec<String>) -> Self {
        self.lesson_numbers = numbers;
        self
    }
}

/// Row-oriented hosted store. Every write is an idempotent upsert scoped by class.
pub trait RemoteStore {
    fn describe(&self) -> String;

    fn fetch(&self, table: &str, class_id: &str) -> Result<Vec<RemoteRow>, RemoteError>;

    fn upsert(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError>;

    /// Upserts `rows` and deletes this class's rows that are not among them.
    fn replace(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for &T {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch(&self, table: &str, class_id: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        (**self).fetch(table, class_id)
    }

    fn upsert(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        (**self).upsert(table, class_id, rows)
    }

    fn replace(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        (**self).replace(table, class_id, rows)
    }
}

impl<T: RemoteStore + ?Sized> RemoteStore for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch(&self, table: &str, class_id: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        (**self).fetch(table, class_id)
    }

    fn upsert(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        (**self).upsert(table, class_id, rows)
    }

    fn replace(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        (**self).replace(table, class_id, rows)
    }
}

/// Stand-in used when no remote is configured or it could not be opened.
#[derive(Debug, Clone)]
pub struct OfflineRemote {
    reason: String,
}

impl OfflineRemote {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RemoteStore for OfflineRemote {
    fn describe(&self) -> String {
        format!("offline ({})", self.reason)
    }

    fn fetch(&self, _table: &str, _class_id: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        Err(RemoteError::Unavailable(self.reason.clone()))
    }

    fn upsert(&self, _table: &str, _class_id: &str, _rows: &[RemoteRow]) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(self.reason.clone()))
    }

    fn replace(&self, _table: &str, _class_id: &str, _rows: &[RemoteRow]) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(self.reason.clone()))
    }
}

#[derive(Debug)]
pub enum RemoteError {
    Unavailable(String),
    Timeout(String),
    Schema(String),
    Db(rusqlite::Error),
    Json(serde_json::Error),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Unavailable(reason) => write!(f, "remote store unavailable: {}", reason),
            RemoteError::Timeout(what) => write!(f, "remote store timed out: {}", what),
            RemoteError::Schema(message) => write!(f, "remote schema mismatch: {}", message),
            RemoteError::Db(err) => write!(f, "remote database error: {}", err),
            RemoteError::Json(err) => write!(f, "remote payload error: {}", err),
        }
    }
}

impl Error for RemoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RemoteError::Db(err) => Some(err),
            RemoteError::Json(err) => Some(err),
            RemoteError::Unavailable(_) | RemoteError::Timeout(_) | RemoteError::Schema(_) => None,
        }
    }
}

impl From<rusqlite::Error> for RemoteError {
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &value {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                RemoteError::Timeout(value.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::ReadOnly
                ) =>
            {
                RemoteError::Unavailable(value.to_string())
            }
            rusqlite::Error::SqliteFailure(_, Some(message))
                if message.contains("no such table") || message.contains("no such column") =>
            {
                RemoteError::Schema(message.clone())
            }
            _ => RemoteError::Db(value),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(value: serde_json::Error) -> Self {
        RemoteError::Json(value)
    }
}

#[cfg(test)]
mod tests;
