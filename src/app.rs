use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::db::{self, SyncStatusRecord};
use crate::domain::activity::Activity;
use crate::domain::half_term::HalfTerm;
use crate::domain::lesson::{LessonRecord, LessonsData, StandardsMap};
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::{LessonPlan, PlanStatus};
use crate::domain::unit::Unit;
use crate::engine::{
    ActivityPatch, AssignOutcome, Change, Engine, Renumbering, ValidationError,
};
use crate::imports::{ImportError, ImportService, ImportStatus, ImportSummary};
use crate::locks::{ClassLock, LockError};
use crate::persistence::{
    CollectionKey, Coordinator, LoadSource, PersistError, SaveMode, SaveReport,
};
use crate::remote::{OfflineRemote, RemoteStore, SqliteRemote};

pub const STATE_DIR: &str = ".cadence";

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub root: PathBuf,
    pub class_id: String,
    pub db_path: Option<PathBuf>,
    pub remote_path: Option<PathBuf>,
}

impl OpenOptions {
    pub fn new(root: impl Into<PathBuf>, class_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            class_id: class_id.into(),
            db_path: None,
            remote_path: None,
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn cache_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("cache").join("state.sqlite"))
    }
}

/// One class opened for reading and mutation. Holds the class lock until dropped.
pub struct App {
    engine: Engine,
    store: Coordinator,
    sources: BTreeMap<CollectionKey, LoadSource>,
    remote_errors: Vec<(CollectionKey, String)>,
    _lock: ClassLock,
}

/// Value of an intent plus what happened to each collection it saved.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub saves: Vec<SaveReport>,
}

impl<T> Outcome<T> {
    pub fn degraded(&self) -> impl Iterator<Item = &SaveReport> {
        self.saves.iter().filter(|report| report.is_degraded())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteLoadError {
    pub collection: CollectionKey,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub class_id: String,
    pub cache_schema_version: Option<String>,
    pub remote: String,
    pub lesson_count: usize,
    pub next_lesson_number: LessonNumber,
    pub loaded_from: BTreeMap<CollectionKey, LoadSource>,
    pub remote_errors: Vec<RemoteLoadError>,
    pub collections: Vec<SyncStatusRecord>,
    pub violations: Vec<String>,
    pub imports: Vec<ImportStatus>,
}

impl App {
    pub fn open(options: &OpenOptions, config: Config) -> Result<Self, AppError> {
        let state_dir = options.state_dir();
        let lock = ClassLock::acquire(
            &state_dir.join("locks"),
            &options.class_id,
            config.lock_timeout(),
        )?;

        let cache_path = options.cache_path();
        ensure_parent_dir(&cache_path)?;
        let conn = db::open_connection(&cache_path.to_string_lossy())?;

        let remote_path = options
            .remote_path
            .clone()
            .or_else(|| config.store.remote_path.clone());
        let remote = open_remote(remote_path.as_deref(), &config);
        let store = Coordinator::new(conn, remote, &options.class_id, config.store.max_blob_bytes);

        let loaded = store.load_class(&config.defaults())?;
        let violations = loaded.state.violations();
        if !violations.is_empty() {
            tracing::warn!(
                class = %options.class_id,
                violations = ?violations,
                "stored collections already break class invariants"
            );
        }
        for (collection, error) in &loaded.remote_errors {
            tracing::warn!(
                class = %options.class_id,
                collection = %collection,
                error = %error,
                "working from the local cache"
            );
        }

        Ok(Self {
            engine: Engine::new(loaded.state, config.categories.clone()),
            store,
            sources: loaded.sources,
            remote_errors: loaded.remote_errors,
            _lock: lock,
        })
    }

    pub fn class_id(&self) -> &str {
        self.store.class_id()
    }

    pub fn categories(&self) -> &[String] {
        self.engine.categories()
    }

    pub fn activities(&self) -> &[Activity] {
        &self.engine.state().activities
    }

    pub fn all_lessons_data(&self) -> &LessonsData {
        &self.engine.state().lessons
    }

    pub fn lesson(&self, number: LessonNumber) -> Option<&LessonRecord> {
        self.engine.state().lessons.get(&number)
    }

    pub fn half_terms(&self) -> &[HalfTerm] {
        &self.engine.state().half_terms
    }

    pub fn half_term_of(&self, number: LessonNumber) -> Option<&HalfTerm> {
        self.engine.state().half_term_of(number)
    }

    pub fn units(&self) -> &[Unit] {
        &self.engine.state().units
    }

    pub fn plans(&self) -> &[LessonPlan] {
        &self.engine.state().plans
    }

    pub fn standards(&self) -> &StandardsMap {
        &self.engine.state().standards
    }

    pub fn lesson_numbers(&self) -> Vec<LessonNumber> {
        self.engine.lesson_numbers()
    }

    pub fn next_lesson_number(&self) -> LessonNumber {
        self.engine.next_lesson_number()
    }

    pub fn add_activity(&mut self, activity: Activity) -> Result<Outcome<String>, AppError> {
        let change = self.engine.add_activity(activity);
        self.persist(change)
    }

    pub fn update_activity(
        &mut self,
        id: &str,
        patch: ActivityPatch,
    ) -> Result<Outcome<Activity>, AppError> {
        let change = self.engine.update_activity(id, patch);
        self.persist(change)
    }

    pub fn delete_activity(&mut self, id: &str) -> Result<Outcome<Activity>, AppError> {
        let change = self.engine.delete_activity(id);
        self.persist(change)
    }

    pub fn create_lesson(&mut self, title: Option<String>) -> Result<Outcome<LessonNumber>, AppError> {
        let change = self.engine.create_lesson(title);
        self.persist(change)
    }

    pub fn delete_lesson(&mut self, number: LessonNumber) -> Result<Outcome<Renumbering>, AppError> {
        let change = self.engine.delete_lesson(number);
        self.persist(change)
    }

    pub fn add_activity_to_lesson(
        &mut self,
        number: LessonNumber,
        activity_id: &str,
    ) -> Result<Outcome<String>, AppError> {
        let change = self.engine.add_activity_to_lesson(number, activity_id);
        self.persist(change)
    }

    pub fn remove_activity_from_lesson(
        &mut self,
        number: LessonNumber,
        activity_id: &str,
    ) -> Result<Outcome<Activity>, AppError> {
        let change = self.engine.remove_activity_from_lesson(number, activity_id);
        self.persist(change)
    }

    pub fn set_lesson_title(
        &mut self,
        number: LessonNumber,
        title: Option<String>,
    ) -> Result<Outcome<()>, AppError> {
        let change = self.engine.set_lesson_title(number, title);
        self.persist(change)
    }

    pub fn set_lesson_standards(
        &mut self,
        number: LessonNumber,
        standards: Vec<String>,
    ) -> Result<Outcome<()>, AppError> {
        let change = self.engine.set_lesson_standards(number, standards);
        self.persist(change)
    }

    pub fn assign_half_term(
        &mut self,
        number: LessonNumber,
        half_term_id: &str,
    ) -> Result<Outcome<AssignOutcome>, AppError> {
        let change = self.engine.assign_half_term(number, half_term_id);
        self.persist(change)
    }

    pub fn unassign_half_term(
        &mut self,
        number: LessonNumber,
    ) -> Result<Outcome<Option<String>>, AppError> {
        let change = self.engine.unassign_half_term(number);
        self.persist(change)
    }

    pub fn set_half_term_complete(
        &mut self,
        half_term_id: &str,
        complete: bool,
    ) -> Result<Outcome<()>, AppError> {
        let change = self.engine.set_half_term_complete(half_term_id, complete);
        self.persist(change)
    }

    pub fn create_unit(
        &mut self,
        name: &str,
        color: &str,
        term: Option<String>,
    ) -> Result<Outcome<Unit>, AppError> {
        let change = self.engine.create_unit(name, color, term);
        self.persist(change)
    }

    pub fn assign_unit_lessons(
        &mut self,
        unit_id: &str,
        numbers: &[LessonNumber],
    ) -> Result<Outcome<Unit>, AppError> {
        let change = self.engine.assign_unit_lessons(unit_id, numbers);
        self.persist(change)
    }

    pub fn delete_unit(&mut self, unit_id: &str) -> Result<Outcome<Unit>, AppError> {
        let change = self.engine.delete_unit(unit_id);
        self.persist(change)
    }

    pub fn create_plan(
        &mut self,
        title: &str,
        date: Option<String>,
    ) -> Result<Outcome<LessonPlan>, AppError> {
        let change = self.engine.create_plan(title, date);
        self.persist(change)
    }

    pub fn add_plan_activity(
        &mut self,
        plan_id: &str,
        activity_id: &str,
    ) -> Result<Outcome<String>, AppError> {
        let change = self.engine.add_plan_activity(plan_id, activity_id);
        self.persist(change)
    }

    pub fn remove_plan_activity(
        &mut self,
        plan_id: &str,
        activity_id: &str,
    ) -> Result<Outcome<()>, AppError> {
        let change = self.engine.remove_plan_activity(plan_id, activity_id);
        self.persist(change)
    }

    pub fn set_plan_status(
        &mut self,
        plan_id: &str,
        status: PlanStatus,
        force: bool,
    ) -> Result<Outcome<LessonPlan>, AppError> {
        let change = self.engine.set_plan_status(plan_id, status, force);
        self.persist(change)
    }

    pub fn finalize_plan(&mut self, plan_id: &str) -> Result<Outcome<LessonNumber>, AppError> {
        let change = self.engine.finalize_plan(plan_id);
        self.persist(change)
    }

    pub fn delete_plan(&mut self, plan_id: &str) -> Result<Outcome<Renumbering>, AppError> {
        let change = self.engine.delete_plan(plan_id);
        self.persist(change)
    }

    /// Bulk import. The merged collections are saved with upserts before the
    /// rows are remembered, so a failed save lets the same file be retried.
    pub fn import_jsonl(
        &mut self,
        file: &str,
        dry_run: bool,
    ) -> Result<Outcome<ImportSummary>, AppError> {
        let store = &self.store;
        let engine = &mut self.engine;
        let mut saves = Vec::new();
        let service = ImportService::new(store.conn(), store.class_id());
        let summary = service.import_jsonl(file, dry_run, |activities| {
            if dry_run {
                let mut scratch = Engine::new(engine.state().clone(), engine.categories().to_vec());
                return Ok(scratch.merge_imported(activities)?.value);
            }
            let change = engine.merge_imported(activities)?;
            saves = store.save_touched(engine.state(), change.touched, SaveMode::Upsert)?;
            Ok(change.value)
        })?;
        Ok(Outcome {
            value: summary,
            saves,
        })
    }

    pub fn status(&self) -> Result<StatusReport, AppError> {
        let imports = ImportService::new(self.store.conn(), self.store.class_id()).list_statuses()?;
        Ok(StatusReport {
            class_id: self.class_id().to_string(),
            cache_schema_version: db::get_meta(self.store.conn(), "schema_version")?,
            remote: self.store.remote().describe(),
            lesson_count: self.lesson_numbers().len(),
            next_lesson_number: self.next_lesson_number(),
            loaded_from: self.sources.clone(),
            remote_errors: self
                .remote_errors
                .iter()
                .map(|(collection, error)| RemoteLoadError {
                    collection: *collection,
                    error: error.clone(),
                })
                .collect(),
            collections: self.store.status()?,
            violations: self
                .engine
                .state()
                .violations()
                .iter()
                .map(ToString::to_string)
                .collect(),
            imports,
        })
    }

    pub fn sync(&self, all: bool) -> Result<Vec<SaveReport>, AppError> {
        Ok(self.store.sync(self.engine.state(), all)?)
    }

    fn persist<T>(
        &self,
        change: Result<Change<T>, ValidationError>,
    ) -> Result<Outcome<T>, AppError> {
        let change = change?;
        let saves = self.store.save_touched(
            self.engine.state(),
            change.touched.iter().copied(),
            SaveMode::Replace,
        )?;
        Ok(Outcome {
            value: change.value,
            saves,
        })
    }
}

fn open_remote(path: Option<&Path>, config: &Config) -> Box<dyn RemoteStore> {
    let Some(path) = path else {
        return Box::new(OfflineRemote::new("no remote configured"));
    };
    match SqliteRemote::open(path, config.remote_timeout()) {
        Ok(remote) => Box::new(remote),
        Err(err) => {
            tracing::warn!(
                remote = %path.display(),
                error = %err,
                "remote store could not be opened; continuing local-only"
            );
            Box::new(OfflineRemote::new(err.to_string()))
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Config(ConfigError),
    Lock(LockError),
    Validation(ValidationError),
    Persist(PersistError),
    Import(ImportError),
    InvalidArgument(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Db(err) => write!(f, "local cache error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Lock(err) => write!(f, "{}", err),
            AppError::Validation(err) => write!(f, "{}", err),
            AppError::Persist(err) => write!(
                f,
                "{}; the change is applied in memory but not saved, retry the command",
                err
            ),
            AppError::Import(err) => write!(f, "{}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Lock(err) => Some(err),
            AppError::Validation(err) => Some(err),
            AppError::Persist(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<LockError> for AppError {
    fn from(value: LockError) -> Self {
        AppError::Lock(value)
    }
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        AppError::Validation(value)
    }
}

impl From<PersistError> for AppError {
    fn from(value: PersistError) -> Self {
        AppError::Persist(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        AppError::Import(value)
    }
}
