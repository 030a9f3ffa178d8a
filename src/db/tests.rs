use super::{
    get_blob, get_meta, list_blob_keys, list_sync_status, open_connection, put_blob,
    record_sync_status, PutBlob, CURRENT_SCHEMA_VERSION,
};
use rusqlite::params;
use uuid::Uuid;

fn unique_db_path() -> String {
    std::env::temp_dir()
        .join(format!("cadence-cache-{}.sqlite", Uuid::now_v7()))
        .display()
        .to_string()
}

fn cleanup_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let candidate = format!("{path}{suffix}");
        let _ = std::fs::remove_file(candidate);
    }
}

fn table_exists(conn: &rusqlite::Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
            params![table_name],
            |row| row.get(0),
        )
        .expect("table existence query should be readable");
    exists == 1
}

#[test]
fn configures_connection_pragmas() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .expect("journal_mode pragma should be readable");
    assert_eq!(journal_mode.to_uppercase(), "WAL");

    let busy_timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .expect("busy_timeout pragma should be readable");
    assert_eq!(busy_timeout, 5000);

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn migrations_are_idempotent_and_record_schema_version() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("first open should migrate");
    drop(conn);
    let conn = open_connection(&path).expect("second open should be a no-op");

    for table in [
        "meta",
        "cache_blob",
        "sync_status",
        "import_state",
        "import_fingerprints",
    ] {
        assert!(table_exists(&conn, table), "missing table {table}");
    }

    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
        .expect("migration count should be readable");
    assert_eq!(applied, CURRENT_SCHEMA_VERSION);
    assert_eq!(
        get_meta(&conn, "schema_version").expect("meta should be readable"),
        Some(CURRENT_SCHEMA_VERSION.to_string())
    );

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn blobs_overwrite_in_place_and_are_listed_per_class() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");

    for (key, class_id, value) in [
        ("lesson-data-y3", "y3", "{}"),
        ("half-terms-y3", "y3", "[]"),
        ("half-terms-y4", "y4", "[]"),
        ("lesson-data-y3", "y3", "{\"1\":{}}"),
    ] {
        put_blob(
            &conn,
            &PutBlob {
                key,
                class_id,
                collection: "test",
                value,
            },
        )
        .expect("blob write should succeed");
    }

    assert_eq!(
        get_blob(&conn, "lesson-data-y3").expect("blob should be readable"),
        Some("{\"1\":{}}".to_string())
    );
    assert_eq!(get_blob(&conn, "units-y3").expect("read should succeed"), None);
    assert_eq!(
        list_blob_keys(&conn, "y3").expect("keys should list"),
        vec!["half-terms-y3".to_string(), "lesson-data-y3".to_string()]
    );

    drop(conn);
    cleanup_db_files(&path);
}

#[test]
fn sync_status_keeps_last_synced_time_across_failures() {
    let path = unique_db_path();
    let conn = open_connection(&path).expect("connection should open");

    record_sync_status(&conn, "y3", "lesson-data", "synced", None).expect("record synced");
    record_sync_status(&conn, "y3", "lesson-data", "pending", Some("offline"))
        .expect("record pending");

    let statuses = list_sync_status(&conn, "y3").expect("status should list");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, "pending");
    assert_eq!(statuses[0].last_error.as_deref(), Some("offline"));
    assert!(statuses[0].last_synced_at.is_some());

    assert!(list_sync_status(&conn, "y4")
        .expect("other class should list")
        .is_empty());

    drop(conn);
    cleanup_db_files(&path);
}
