use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Serialize, Serializer};

use crate::db::{self, PutBlob, SyncStatusRecord};
use crate::domain::class_state::ClassState;
use crate::domain::half_term::HalfTermSeed;
use crate::remote::RemoteStore;

mod collections;

pub use collections::{snapshot_of, Collection, Snapshot};

/// Names one persisted collection of a class. The cache key and the remote
/// table both derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionKey {
    Activities,
    Lessons,
    LessonPlans,
    HalfTerms,
    Units,
    Standards,
}

impl CollectionKey {
    pub const ALL: [CollectionKey; 6] = [
        CollectionKey::Activities,
        CollectionKey::Lessons,
        CollectionKey::LessonPlans,
        CollectionKey::HalfTerms,
        CollectionKey::Units,
        CollectionKey::Standards,
    ];

    /// Everything a lesson deletion can rewrite.
    pub const LESSON_CASCADE: [CollectionKey; 6] = Self::ALL;

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKey::Activities => "activities",
            CollectionKey::Lessons => "lesson-data",
            CollectionKey::LessonPlans => "lesson-plans",
            CollectionKey::HalfTerms => "half-terms",
            CollectionKey::Units => "units",
            CollectionKey::Standards => "lesson-standards",
        }
    }

    pub fn cache_key(self, class_id: &str) -> String {
        format!("{}-{}", self.as_str(), class_id)
    }

    /// Remote table, or `None` for collections kept in the local cache only.
    pub fn remote_table(self) -> Option<&'static str> {
        match self {
            CollectionKey::Activities => Some("activities"),
            CollectionKey::Lessons => Some("lessons"),
            CollectionKey::LessonPlans => Some("lesson_plans"),
            CollectionKey::HalfTerms => Some("half_terms"),
            CollectionKey::Standards => Some("lesson_standards"),
            CollectionKey::Units => None,
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| format!("unknown collection '{}'", value))
    }
}

impl Serialize for CollectionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Seed values for collections that start non-empty.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    pub half_terms: Vec<HalfTermSeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    Local,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<C> {
    pub value: C,
    pub source: LoadSource,
    pub remote_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedClass {
    pub state: ClassState,
    pub sources: BTreeMap<CollectionKey, LoadSource>,
    pub remote_errors: Vec<(CollectionKey, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RemoteOutcome {
    Synced,
    Failed(String),
    LocalOnly,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub collection: CollectionKey,
    pub local_bytes: usize,
    pub remote: RemoteOutcome,
}

impl SaveReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.remote, RemoteOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// The remote ends up holding exactly this snapshot.
    Replace,
    /// Rows are upserted; remote rows absent from the snapshot are kept.
    Upsert,
}

const STATE_SYNCED: &str = "synced";
const STATE_PENDING: &str = "pending";
const STATE_LOCAL_ONLY: &str = "local_only";

/// Local-first dual writer: the cache write is synchronous and fatal on failure,
/// the remote write trails it and only ever degrades to a warning.
pub struct Coordinator<R: RemoteStore = Box<dyn RemoteStore>> {
    conn: Connection,
    remote: R,
    class_id: String,
    max_blob_bytes: usize,
}

impl<R: RemoteStore> Coordinator<R> {
    pub fn new(conn: Connection, remote: R, class_id: &str, max_blob_bytes: usize) -> Self {
        Self {
            conn,
            remote,
            class_id: class_id.to_string(),
            max_blob_bytes,
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    /// Remote first (writing it through to the cache), then the cache, then the
    /// collection's default. A cache entry with unsynced changes wins over the remote,
    /// even when those changes emptied the collection.
    pub fn load<C: Collection>(&self, defaults: &Defaults) -> Result<Loaded<C>, PersistError> {
        let key = C::KEY;
        let mut remote_error = None;

        if let Some(table) = key.remote_table() {
            if self.is_pending(key)? {
                if let Some(value) = self.read_local::<C>()? {
                    tracing::debug!(
                        class = %self.class_id,
                        collection = %key,
                        "cache has unsynced changes; using it over the remote copy"
                    );
                    return Ok(Loaded {
                        value,
                        source: LoadSource::Local,
                        remote_error: None,
                    });
                }
            }

            match self.remote.fetch(table, &self.class_id) {
                Ok(rows) if !rows.is_empty() => match C::from_rows(rows) {
                    Ok(mut value) => {
                        value.arrange(defaults);
                        if let Err(err) = self.write_local(&self.conn, &value) {
                            tracing::warn!(
                                class = %self.class_id,
                                collection = %key,
                                error = %err,
                                "could not copy remote collection into the local cache"
                            );
                        }
                        tracing::debug!(class = %self.class_id, collection = %key, "loaded from remote");
                        return Ok(Loaded {
                            value,
                            source: LoadSource::Remote,
                            remote_error: None,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(
                            class = %self.class_id,
                            collection = %key,
                            error = %err,
                            "remote rows did not decode; falling back to the local cache"
                        );
                        remote_error = Some(format!("remote rows did not decode: {}", err));
                    }
                },
                Ok(_) => {
                    tracing::debug!(class = %self.class_id, collection = %key, "remote is empty");
                }
                Err(err) => {
                    tracing::warn!(
                        class = %self.class_id,
                        collection = %key,
                        error = %err,
                        "remote load failed; falling back to the local cache"
                    );
                    remote_error = Some(err.to_string());
                }
            }
        }

        if let Some(value) = self.read_local::<C>()?.filter(|value| !value.is_empty()) {
            tracing::debug!(class = %self.class_id, collection = %key, "loaded from local cache");
            return Ok(Loaded {
                value,
                source: LoadSource::Local,
                remote_error,
            });
        }

        Ok(Loaded {
            value: C::initial(defaults),
            source: LoadSource::Default,
            remote_error,
        })
    }

    pub fn load_class(&self, defaults: &Defaults) -> Result<LoadedClass, PersistError> {
        let mut loaded = LoadedClass {
            state: ClassState::empty(&self.class_id),
            ..LoadedClass::default()
        };

        let activities = self.load(defaults)?;
        loaded.note(CollectionKey::Activities, activities.source, activities.remote_error);
        loaded.state.activities = activities.value;

        let lessons = self.load(defaults)?;
        loaded.note(CollectionKey::Lessons, lessons.source, lessons.remote_error);
        loaded.state.lessons = lessons.value;

        let plans = self.load(defaults)?;
        loaded.note(CollectionKey::LessonPlans, plans.source, plans.remote_error);
        loaded.state.plans = plans.value;

        let half_terms = self.load(defaults)?;
        loaded.note(CollectionKey::HalfTerms, half_terms.source, half_terms.remote_error);
        loaded.state.half_terms = half_terms.value;

        let units = self.load(defaults)?;
        loaded.note(CollectionKey::Units, units.source, units.remote_error);
        loaded.state.units = units.value;

        let standards = self.load(defaults)?;
        loaded.note(CollectionKey::Standards, standards.source, standards.remote_error);
        loaded.state.standards = standards.value;

        Ok(loaded)
    }

    #[cfg(test)]
    pub fn save<C: Collection>(&self, value: &C) -> Result<SaveReport, PersistError> {
        self.save_all(&[value as &dyn Snapshot], SaveMode::Replace)
            .map(|mut reports| reports.remove(0))
    }

    /// Writes the touched collections of `state` to the cache in one transaction,
    /// then replicates each to the remote.
    pub fn save_touched(
        &self,
        state: &ClassState,
        touched: impl IntoIterator<Item = CollectionKey>,
        mode: SaveMode,
    ) -> Result<Vec<SaveReport>, PersistError> {
        let snapshots: Vec<&dyn Snapshot> = touched
            .into_iter()
            .map(|key| snapshot_of(state, key))
            .collect();
        self.save_all(&snapshots, mode)
    }

    fn save_all(
        &self,
        snapshots: &[&dyn Snapshot],
        mode: SaveMode,
    ) -> Result<Vec<SaveReport>, PersistError> {
        let tx = self.conn.unchecked_transaction().map_err(LocalStoreError::Db)?;
        let mut sizes = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            sizes.push(self.write_local(&tx, *snapshot)?);
        }
        tx.commit().map_err(LocalStoreError::Db)?;

        Ok(snapshots
            .iter()
            .zip(sizes)
            .map(|(snapshot, local_bytes)| SaveReport {
                collection: snapshot.key(),
                local_bytes,
                remote: self.replicate(*snapshot, mode),
            })
            .collect())
    }

    /// Best-effort push of one snapshot. Never fails; the outcome is recorded
    /// in `sync_status`.
    pub fn replicate(&self, snapshot: &dyn Snapshot, mode: SaveMode) -> RemoteOutcome {
        let key = snapshot.key();
        let Some(table) = key.remote_table() else {
            self.record_status(key, STATE_LOCAL_ONLY, None);
            return RemoteOutcome::LocalOnly;
        };

        let result = snapshot
            .rows()
            .map_err(|err| err.to_string())
            .and_then(|rows| {
                let pushed = match mode {
                    SaveMode::Replace => self.remote.replace(table, &self.class_id, &rows),
                    SaveMode::Upsert => self.remote.upsert(table, &self.class_id, &rows),
                };
                pushed.map_err(|err| err.to_string())
            });

        match result {
            Ok(()) => {
                self.record_status(key, STATE_SYNCED, None);
                RemoteOutcome::Synced
            }
            Err(reason) => {
                tracing::warn!(
                    class = %self.class_id,
                    collection = %key,
                    remote = %self.remote.describe(),
                    error = %reason,
                    "remote write failed; change is kept locally and marked pending"
                );
                self.record_status(key, STATE_PENDING, Some(&reason));
                RemoteOutcome::Failed(reason)
            }
        }
    }

    /// Re-pushes collections whose last remote write failed (or every collection with `all`).
    pub fn sync(&self, state: &ClassState, all: bool) -> Result<Vec<SaveReport>, PersistError> {
        let mut reports = Vec::new();
        for key in CollectionKey::ALL {
            let snapshot = snapshot_of(state, key);
            let local_bytes = snapshot.encode().map_err(LocalStoreError::Json)?.len();
            let remote = if all || self.is_pending(key)? {
                self.replicate(snapshot, SaveMode::Replace)
            } else {
                RemoteOutcome::Skipped
            };
            reports.push(SaveReport {
                collection: key,
                local_bytes,
                remote,
            });
        }
        Ok(reports)
    }

    pub fn status(&self) -> Result<Vec<SyncStatusRecord>, PersistError> {
        Ok(db::list_sync_status(&self.conn, &self.class_id).map_err(LocalStoreError::Db)?)
    }

    fn is_pending(&self, key: CollectionKey) -> Result<bool, PersistError> {
        Ok(self
            .status()?
            .iter()
            .any(|record| record.collection == key.as_str() && record.state == STATE_PENDING))
    }

    fn read_local<C: Collection>(&self) -> Result<Option<C>, PersistError> {
        let cache_key = C::KEY.cache_key(&self.class_id);
        let Some(raw) = db::get_blob(&self.conn, &cache_key).map_err(LocalStoreError::Db)? else {
            return Ok(None);
        };
        let value: C = serde_json::from_str(&raw).map_err(|source| PersistError::Decode {
            key: cache_key,
            source,
        })?;
        Ok(Some(value))
    }

    fn write_local(&self, conn: &Connection, snapshot: &dyn Snapshot) -> Result<usize, PersistError> {
        let key = snapshot.key();
        let cache_key = key.cache_key(&self.class_id);
        let value = snapshot.encode().map_err(LocalStoreError::Json)?;
        if value.len() > self.max_blob_bytes {
            return Err(LocalStoreError::QuotaExceeded {
                key: cache_key,
                bytes: value.len(),
                limit: self.max_blob_bytes,
            }
            .into());
        }
        db::put_blob(
            conn,
            &PutBlob {
                key: &cache_key,
                class_id: &self.class_id,
                collection: key.as_str(),
                value: &value,
            },
        )
        .map_err(LocalStoreError::Db)?;
        Ok(value.len())
    }

    fn record_status(&self, key: CollectionKey, state: &str, error: Option<&str>) {
        if let Err(err) = db::record_sync_status(&self.conn, &self.class_id, key.as_str(), state, error)
        {
            tracing::warn!(
                class = %self.class_id,
                collection = %key,
                error = %err,
                "could not record sync status"
            );
        }
    }
}

impl LoadedClass {
    fn note(&mut self, key: CollectionKey, source: LoadSource, remote_error: Option<String>) {
        self.sources.insert(key, source);
        if let Some(error) = remote_error {
            self.remote_errors.push((key, error));
        }
    }
}

#[derive(Debug)]
pub enum LocalStoreError {
    Db(rusqlite::Error),
    Json(serde_json::Error),
    QuotaExceeded {
        key: String,
        bytes: usize,
        limit: usize,
    },
}

impl fmt::Display for LocalStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalStoreError::Db(err) => write!(f, "local cache error: {}", err),
            LocalStoreError::Json(err) => write!(f, "could not serialize collection: {}", err),
            LocalStoreError::QuotaExceeded { key, bytes, limit } => write!(
                f,
                "local cache quota exceeded for '{}': {} bytes (limit {})",
                key, bytes, limit
            ),
        }
    }
}

impl Error for LocalStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LocalStoreError::Db(err) => Some(err),
            LocalStoreError::Json(err) => Some(err),
            LocalStoreError::QuotaExceeded { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum PersistError {
    Local(LocalStoreError),
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Local(err) => write!(f, "{}", err),
            PersistError::Decode { key, source } => {
                write!(f, "local cache entry '{}' is unreadable: {}", key, source)
            }
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PersistError::Local(err) => Some(err),
            PersistError::Decode { source, .. } => Some(source),
        }
    }
}

impl From<LocalStoreError> for PersistError {
    fn from(value: LocalStoreError) -> Self {
        PersistError::Local(value)
    }
}

#[cfg(test)]
mod tests;
