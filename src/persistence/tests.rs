use uuid::Uuid;

use super::{
    CollectionKey, Coordinator, Defaults, LoadSource, LocalStoreError, PersistError,
    RemoteOutcome, SaveMode,
};
use crate::db::{self, open_connection};
use crate::domain::activity::Activity;
use crate::domain::class_state::ClassState;
use crate::domain::half_term::{default_half_terms, HalfTerm, HalfTermSeed};
use crate::domain::lesson::{LessonRecord, LessonsData};
use crate::domain::lesson_number::LessonNumber;
use crate::domain::unit::Unit;
use crate::remote::memory::MemoryRemote;
use crate::remote::RowKey;

const QUOTA: usize = 5 * 1024 * 1024;

fn unique_db_path() -> String {
    std::env::temp_dir()
        .join(format!("cadence-persist-{}.sqlite", Uuid::now_v7()))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

fn n(value: u32) -> LessonNumber {
    LessonNumber::new(value).expect("lesson number")
}

fn defaults() -> Defaults {
    Defaults {
        half_terms: [("A1", "Autumn 1"), ("A2", "Autumn 2")]
            .into_iter()
            .map(|(id, name)| HalfTermSeed {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect(),
    }
}

fn coordinator<'r>(path: &str, remote: &'r MemoryRemote) -> Coordinator<&'r MemoryRemote> {
    let conn = open_connection(path).expect("cache should open");
    Coordinator::new(conn, remote, "y3", QUOTA)
}

fn terms_with(lessons: &[(usize, u32)]) -> Vec<HalfTerm> {
    let mut terms = default_half_terms(&defaults().half_terms);
    for (index, number) in lessons {
        terms[*index].lessons.push(n(*number));
    }
    terms
}

#[test]
fn empty_stores_fall_back_to_seeded_defaults() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    let terms = store
        .load::<Vec<HalfTerm>>(&defaults())
        .expect("load should succeed");
    assert_eq!(terms.source, LoadSource::Default);
    assert_eq!(terms.value.len(), 2);
    assert_eq!(terms.value[0].id, "A1");

    let lessons = store.load::<LessonsData>(&defaults()).expect("load should succeed");
    assert_eq!(lessons.source, LoadSource::Default);
    assert!(lessons.value.is_empty());

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn remote_failure_keeps_the_change_in_the_local_cache() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    remote.set_failing(true);

    let store = coordinator(&path, &remote);
    let terms = terms_with(&[(0, 1)]);
    let report = store.save(&terms).expect("local write must succeed");
    assert_eq!(report.collection, CollectionKey::HalfTerms);
    assert!(report.local_bytes > 0);
    assert!(report.is_degraded());
    assert!(matches!(report.remote, RemoteOutcome::Failed(ref reason) if reason.contains("simulated")));

    let statuses = store.status().expect("status should list");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].collection, "half-terms");
    assert_eq!(statuses[0].state, "pending");
    drop(store);

    let reopened = coordinator(&path, &remote);
    let loaded = reopened
        .load::<Vec<HalfTerm>>(&defaults())
        .expect("reload should succeed");
    assert_eq!(loaded.source, LoadSource::Local);
    assert_eq!(loaded.value, terms);
    assert!(remote.rows("half_terms", "y3").is_empty());

    drop(reopened);
    cleanup_db_files(&path);
}

#[test]
fn remote_copy_wins_and_is_written_through_to_the_cache() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();

    let mut lessons = LessonsData::new();
    lessons.insert(n(1), LessonRecord::new(Some("Pulse".to_string())));
    {
        let store = coordinator(&path, &remote);
        store.save(&lessons).expect("save should succeed");
    }
    cleanup_db_files(&path);

    let store = coordinator(&path, &remote);
    let loaded = store.load::<LessonsData>(&defaults()).expect("load should succeed");
    assert_eq!(loaded.source, LoadSource::Remote);
    assert_eq!(loaded.value, lessons);
    assert!(db::get_blob(store.conn(), "lesson-data-y3")
        .expect("blob should be readable")
        .is_some());

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn unsynced_local_changes_win_until_sync_pushes_them() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    store.save(&terms_with(&[(0, 1)])).expect("first save");
    remote.set_failing(true);
    let newer = terms_with(&[(0, 1), (1, 2)]);
    store.save(&newer).expect("local write must succeed");
    remote.set_failing(false);

    let loaded = store
        .load::<Vec<HalfTerm>>(&defaults())
        .expect("load should succeed");
    assert_eq!(loaded.source, LoadSource::Local);
    assert_eq!(loaded.value, newer);

    let mut state = ClassState::empty("y3");
    state.half_terms = newer.clone();
    let reports = store.sync(&state, false).expect("sync should succeed");
    let pushed: Vec<_> = reports
        .iter()
        .filter(|report| report.remote == RemoteOutcome::Synced)
        .map(|report| report.collection)
        .collect();
    assert_eq!(pushed, vec![CollectionKey::HalfTerms]);
    assert!(reports
        .iter()
        .filter(|report| report.collection != CollectionKey::HalfTerms)
        .all(|report| report.remote == RemoteOutcome::Skipped));

    let rows = remote.rows("half_terms", "y3");
    assert_eq!(rows[1].lesson_numbers, vec!["2".to_string()]);
    assert!(store
        .status()
        .expect("status should list")
        .iter()
        .all(|record| record.state == "synced"));

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn pending_emptied_collection_is_not_revived_from_the_remote() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    let mut lessons = LessonsData::new();
    lessons.insert(n(1), LessonRecord::new(Some("Pulse".to_string())));
    store.save(&lessons).expect("first save");

    remote.set_failing(true);
    let report = store.save(&LessonsData::new()).expect("local write must succeed");
    assert!(report.is_degraded());
    remote.set_failing(false);
    drop(store);

    let reopened = coordinator(&path, &remote);
    let loaded = reopened
        .load::<LessonsData>(&defaults())
        .expect("reload should succeed");
    assert_eq!(loaded.source, LoadSource::Local);
    assert!(loaded.value.is_empty());
    assert_eq!(remote.rows("lessons", "y3").len(), 1);

    drop(reopened);
    cleanup_db_files(&path);
}

#[test]
fn half_terms_read_from_the_remote_keep_the_configured_order() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let mut reversed = terms_with(&[(1, 1)]);
    reversed.reverse();
    {
        let store = coordinator(&path, &remote);
        store.save(&reversed).expect("save should succeed");
    }
    cleanup_db_files(&path);
    assert_eq!(remote.rows("half_terms", "y3")[0].key, RowKey::Id("A2".to_string()));

    let store = coordinator(&path, &remote);
    let loaded = store
        .load::<Vec<HalfTerm>>(&defaults())
        .expect("load should succeed");
    assert_eq!(loaded.source, LoadSource::Remote);
    let ids: Vec<&str> = loaded.value.iter().map(|term| term.id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2"]);
    assert_eq!(loaded.value[1].lessons, vec![n(1)]);

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn remote_ids_take_precedence_on_activities_read_back() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    let mut echo = Activity::new("Echo", "Singing", 5);
    echo.lesson_number = Some(n(1));
    let activities = vec![echo, Activity::new("Drone", "Listening", 3)];
    store.save(&activities).expect("save should succeed");

    let rows = remote.rows("activities", "y3");
    assert_eq!(rows.len(), 2);

    drop(store);
    cleanup_db_files(&path);
    let store = coordinator(&path, &remote);
    let loaded = store
        .load::<Vec<Activity>>(&defaults())
        .expect("load should succeed");
    assert_eq!(loaded.source, LoadSource::Remote);
    assert_eq!(loaded.value[0].id.as_deref(), Some("1"));
    assert_eq!(loaded.value[1].id.as_deref(), Some("2"));
    assert_eq!(loaded.value[0].lesson_number, Some(n(1)));

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn units_stay_in_the_local_cache() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    let units = vec![Unit::new("Pulse", "#ff0000", None, "2026-01-01T00:00:00Z")];
    let report = store.save(&units).expect("save should succeed");
    assert_eq!(report.remote, RemoteOutcome::LocalOnly);
    assert_eq!(remote.writes(), 0);

    let loaded = store.load::<Vec<Unit>>(&defaults()).expect("load should succeed");
    assert_eq!(loaded.source, LoadSource::Local);
    assert_eq!(loaded.value, units);

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn save_touched_writes_only_the_named_collections() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let store = coordinator(&path, &remote);

    let mut state = ClassState::empty("y3");
    state.lessons.insert(n(1), LessonRecord::default());
    state.standards.insert(n(1), vec!["MU.1".to_string()]);
    let reports = store
        .save_touched(
            &state,
            [CollectionKey::Lessons, CollectionKey::Standards],
            SaveMode::Replace,
        )
        .expect("save should succeed");
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.remote == RemoteOutcome::Synced));

    let keys = db::list_blob_keys(store.conn(), "y3").expect("keys should list");
    assert_eq!(
        keys,
        vec!["lesson-data-y3".to_string(), "lesson-standards-y3".to_string()]
    );

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn oversized_blobs_are_a_fatal_local_error() {
    let path = unique_db_path();
    let remote = MemoryRemote::new();
    let conn = open_connection(&path).expect("cache should open");
    let store = Coordinator::new(conn, &remote, "y3", 16);

    let err = store
        .save(&terms_with(&[]))
        .expect_err("blob larger than the quota must fail");
    assert!(matches!(
        err,
        PersistError::Local(LocalStoreError::QuotaExceeded { limit: 16, .. })
    ));
    assert_eq!(remote.writes(), 0);
    assert!(db::get_blob(store.conn(), "half-terms-y3")
        .expect("read should succeed")
        .is_none());

    drop(store);
    cleanup_db_files(&path);
}

#[test]
fn collection_keys_round_trip_through_their_names() {
    for key in CollectionKey::ALL {
        assert_eq!(key.as_str().parse::<CollectionKey>(), Ok(key));
    }
    assert_eq!(CollectionKey::Units.cache_key("y3"), "units-y3");
    assert_eq!(CollectionKey::Units.remote_table(), None);
    assert!("lessons".parse::<CollectionKey>().is_err());
}
