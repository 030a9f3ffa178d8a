use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::{RemoteError, RemoteRow, RemoteStore, RowKey};

/// In-process remote with a failure switch, for exercising degraded paths.
#[derive(Default)]
pub struct MemoryRemote {
    tables: RefCell<BTreeMap<(String, String), Vec<RemoteRow>>>,
    failing: Cell<bool>,
    writes: Cell<usize>,
    next_id: Cell<u64>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn rows(&self, table: &str, class_id: &str) -> Vec<RemoteRow> {
        self.tables
            .borrow()
            .get(&(table.to_string(), class_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.failing.get() {
            Err(RemoteError::Unavailable("simulated network failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn assign_id(&self, row: &RemoteRow) -> RemoteRow {
        let mut stored = row.clone();
        if stored.remote_id.is_none() {
            stored.remote_id = Some(match &row.key {
                RowKey::Id(id) => id.clone(),
                RowKey::Activity { .. } => {
                    let id = self.next_id.get() + 1;
                    self.next_id.set(id);
                    id.to_string()
                }
            });
        }
        stored
    }
}

impl RemoteStore for MemoryRemote {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn fetch(&self, table: &str, class_id: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        self.check()?;
        Ok(self.rows(table, class_id))
    }

    fn upsert(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        self.check()?;
        self.writes.set(self.writes.get() + 1);
        let mut tables = self.tables.borrow_mut();
        let stored = tables
            .entry((table.to_string(), class_id.to_string()))
            .or_default();
        for row in rows {
            match stored.iter_mut().find(|existing| existing.key == row.key) {
                Some(existing) => {
                    let remote_id = existing.remote_id.clone();
                    *existing = row.clone();
                    existing.remote_id = remote_id;
                }
                None => stored.push(self.assign_id(row)),
            }
        }
        Ok(())
    }

    fn replace(&self, table: &str, class_id: &str, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        self.upsert(table, class_id, rows)?;
        let mut tables = self.tables.borrow_mut();
        if let Some(stored) = tables.get_mut(&(table.to_string(), class_id.to_string())) {
            stored.retain(|existing| rows.iter().any(|row| row.key == existing.key));
        }
        Ok(())
    }
}
