use std::error::Error;
use std::fmt;

use crate::engine::ValidationError;
use crate::persistence::PersistError;

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Json(serde_json::Error),
    InvalidRecord(String),
    Rejected(ValidationError),
    Persist(PersistError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "I/O error: {}", err),
            ImportError::Db(err) => write!(f, "database error: {}", err),
            ImportError::Json(err) => write!(f, "JSON parse error: {}", err),
            ImportError::InvalidRecord(message) => write!(f, "invalid row: {}", message),
            ImportError::Rejected(err) => write!(f, "import rejected: {}", err),
            ImportError::Persist(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Db(err) => Some(err),
            ImportError::Json(err) => Some(err),
            ImportError::Rejected(err) => Some(err),
            ImportError::Persist(err) => Some(err),
            ImportError::InvalidRecord(_) => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(value: std::io::Error) -> Self {
        ImportError::Io(value)
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(value: rusqlite::Error) -> Self {
        ImportError::Db(value)
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        ImportError::Json(value)
    }
}

impl From<ValidationError> for ImportError {
    fn from(value: ValidationError) -> Self {
        ImportError::Rejected(value)
    }
}

impl From<PersistError> for ImportError {
    fn from(value: PersistError) -> Self {
        ImportError::Persist(value)
    }
}
