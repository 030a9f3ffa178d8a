use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum LockError {
    Busy { class_id: String, path: PathBuf },
    InvalidClass(String),
    Io(std::io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Busy { class_id, path } => write!(
                f,
                "class '{}' is being changed by another process (lock {})",
                class_id,
                path.display()
            ),
            LockError::InvalidClass(class_id) => write!(
                f,
                "class id '{}' may only contain letters, digits, '-' and '_'",
                class_id
            ),
            LockError::Io(err) => write!(f, "lock I/O error: {}", err),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LockError {
    fn from(value: std::io::Error) -> Self {
        LockError::Io(value)
    }
}

/// Exclusive mutation lock for one class. Held for the lifetime of an open
/// handle; the lock file is removed on drop.
#[derive(Debug)]
pub struct ClassLock {
    class_id: String,
    path: PathBuf,
    _file: File,
}

impl ClassLock {
    pub fn path_for(locks_dir: &Path, class_id: &str) -> Result<PathBuf, LockError> {
        let valid = !class_id.is_empty()
            && class_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(LockError::InvalidClass(class_id.to_string()));
        }
        Ok(locks_dir.join(format!("{class_id}.lock")))
    }

    pub fn acquire(locks_dir: &Path, class_id: &str, timeout: Duration) -> Result<Self, LockError> {
        let path = Self::path_for(locks_dir, class_id)?;
        let start = Instant::now();
        loop {
            match try_acquire(&path, class_id)? {
                Some(guard) => return Ok(guard),
                None if start.elapsed() >= timeout => {
                    return Err(LockError::Busy {
                        class_id: class_id.to_string(),
                        path,
                    });
                }
                None => thread::sleep(Duration::from_millis(10)),
            }
        }
    }

    #[cfg(test)]
    pub fn try_acquire(locks_dir: &Path, class_id: &str) -> Result<Option<Self>, LockError> {
        let path = Self::path_for(locks_dir, class_id)?;
        try_acquire(&path, class_id)
    }

}

impl Drop for ClassLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                class = %self.class_id,
                path = %self.path.display(),
                error = %err,
                "could not remove class lock"
            );
        }
    }
}

fn try_acquire(path: &Path, class_id: &str) -> Result<Option<ClassLock>, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            Ok(Some(ClassLock {
                class_id: class_id.to_string(),
                path: path.to_path_buf(),
                _file: file,
            }))
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(LockError::Io(err)),
    }
}
