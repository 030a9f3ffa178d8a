use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::{OfflineRemote, RemoteError, RemoteRow, RemoteStore, RowKey, SqliteRemote};

fn unique_remote_path() -> PathBuf {
    std::env::temp_dir().join(format!("cadence-remote-test-{}.sqlite", Uuid::now_v7()))
}

fn activity_row(name: &str, lesson: &str, minutes: u32) -> RemoteRow {
    RemoteRow::new(
        RowKey::Activity {
            name: name.to_string(),
            category: "Singing".to_string(),
            lesson_number: lesson.to_string(),
        },
        json!({ "activity": name, "category": "Singing", "time": minutes, "lessonNumber": lesson }),
    )
}

#[test]
fn activity_upserts_are_idempotent_on_the_composite_key() {
    let path = unique_remote_path();
    let remote = SqliteRemote::open(&path, Duration::from_millis(200)).expect("remote should open");

    remote
        .upsert("activities", "y3", &[activity_row("Echo", "1", 5)])
        .expect("first upsert should succeed");
    remote
        .upsert("activities", "y3", &[activity_row("Echo", "1", 8)])
        .expect("second upsert should succeed");
    remote
        .upsert("activities", "y3", &[activity_row("Echo", "2", 8)])
        .expect("different lesson is a different row");

    let rows = remote.fetch("activities", "y3").expect("fetch should succeed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].data["time"], 8);
    assert!(rows.iter().all(|row| row.remote_id.is_some()));

    assert!(remote
        .fetch("activities", "y4")
        .expect("other class should be readable")
        .is_empty());

    let _ = std::fs::remove_file(path);
}

#[test]
fn replace_removes_rows_missing_from_the_snapshot() {
    let path = unique_remote_path();
    let remote = SqliteRemote::open(&path, Duration::from_millis(200)).expect("remote should open");

    let term = |id: &str, lessons: Vec<String>| {
        RemoteRow::new(RowKey::Id(id.to_string()), json!({ "id": id, "lessons": lessons.clone() }))
            .with_lesson_numbers(lessons)
    };
    remote
        .replace(
            "half_terms",
            "y3",
            &[term("A1", vec!["1".to_string()]), term("A2", Vec::new())],
        )
        .expect("replace should succeed");
    remote
        .replace("half_terms", "y5", &[term("A1", Vec::new())])
        .expect("replace for another class should succeed");
    remote
        .replace("half_terms", "y3", &[term("A2", vec!["2".to_string()])])
        .expect("second replace should succeed");

    let rows = remote.fetch("half_terms", "y3").expect("fetch should succeed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, RowKey::Id("A2".to_string()));
    assert_eq!(rows[0].lesson_numbers, vec!["2".to_string()]);
    assert_eq!(
        remote
            .fetch("half_terms", "y5")
            .expect("fetch should succeed")
            .len(),
        1
    );

    remote
        .replace("activities", "y3", &[activity_row("A", "", 1), activity_row("B", "", 1)])
        .expect("activity replace should succeed");
    remote
        .replace("activities", "y3", &[activity_row("B", "", 2)])
        .expect("activity replace should succeed");
    let activities = remote.fetch("activities", "y3").expect("fetch should succeed");
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].data["activity"], "B");

    let _ = std::fs::remove_file(path);
}

#[test]
fn keyed_rows_come_back_in_insertion_order() {
    let path = unique_remote_path();
    let remote = SqliteRemote::open(&path, Duration::from_millis(200)).expect("remote should open");

    let term = |id: &str| RemoteRow::new(RowKey::Id(id.to_string()), json!({ "id": id }));
    let seeded = ["A1", "A2", "SP1", "SP2", "SM1", "SM2"];
    let rows: Vec<RemoteRow> = seeded.iter().copied().map(term).collect();
    remote
        .replace("half_terms", "y3", &rows)
        .expect("replace should succeed");
    remote
        .replace("half_terms", "y3", &rows)
        .expect("rewriting existing rows should succeed");

    let fetched: Vec<RowKey> = remote
        .fetch("half_terms", "y3")
        .expect("fetch should succeed")
        .into_iter()
        .map(|row| row.key)
        .collect();
    let expected: Vec<RowKey> = seeded.iter().map(|id| RowKey::Id(id.to_string())).collect();
    assert_eq!(fetched, expected);

    let _ = std::fs::remove_file(path);
}

#[test]
fn unknown_tables_and_mismatched_keys_are_schema_errors() {
    let path = unique_remote_path();
    let remote = SqliteRemote::open(&path, Duration::from_millis(200)).expect("remote should open");

    let err = remote
        .fetch("units", "y3")
        .expect_err("units are not replicated");
    assert!(matches!(err, RemoteError::Schema(_)));

    let err = remote
        .upsert("lessons", "y3", &[activity_row("A", "1", 1)])
        .expect_err("activity key should not fit lessons");
    assert!(err.to_string().contains("does not fit table"));

    let _ = std::fs::remove_file(path);
}

#[test]
fn offline_remote_reports_unavailable() {
    let remote = OfflineRemote::new("no remote configured");
    let err = remote.fetch("lessons", "y3").expect_err("offline fetch fails");
    assert!(matches!(err, RemoteError::Unavailable(_)));
    assert!(remote.describe().contains("no remote configured"));
}
