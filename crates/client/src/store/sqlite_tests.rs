// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use tempfile::TempDir;

fn item(item_type: &str, created_at: u64) -> OfflineItem {
    OfflineItem::new(item_type, json!({"line": "L1", "at": created_at}), created_at)
}

#[test]
fn set_and_get_round_trip_all_fields() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let mut original = item("report", 10);
    original.retry_count = 2;
    original.last_error = Some("timed out".into());

    db.set(&original).unwrap();
    assert_eq!(db.get(&original.id).unwrap(), Some(original));
    assert_eq!(db.get("missing").unwrap(), None);
}

#[test]
fn update_never_inserts() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let mut stored = item("report", 10);
    let missing = item("report", 11);
    db.set(&stored).unwrap();

    stored.record_failure(3, "timeout");
    assert!(db.update(&stored).unwrap());
    assert!(!db.update(&missing).unwrap());
    assert_eq!(db.update_many(&[stored.clone(), missing.clone()]).unwrap(), 1);

    assert_eq!(db.get(&missing.id).unwrap(), None);
    assert_eq!(db.get(&stored.id).unwrap().unwrap().retry_count, 1);
}

#[test]
fn set_replaces_existing_row() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let mut stored = item("report", 10);
    db.set(&stored).unwrap();

    stored.mark_synced();
    db.set(&stored).unwrap();

    let items = db.list(None).unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].synced);
}

#[test]
fn list_filters_by_type_oldest_first() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let later = item("report", 30);
    let earlier = item("report", 20);
    let other = item("alarm_ack", 25);
    db.set_many(&[later.clone(), earlier.clone(), other.clone()]).unwrap();

    let reports = db.list(Some("report")).unwrap();
    assert_eq!(reports, vec![earlier.clone(), later.clone()]);
    assert_eq!(db.list(None).unwrap(), vec![earlier, other, later]);
}

#[test]
fn clear_by_type_and_all() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    db.set_many(&[item("a", 1), item("a", 2), item("b", 3)]).unwrap();

    assert_eq!(db.clear(Some("a")).unwrap(), 2);
    assert_eq!(db.list(None).unwrap().len(), 1);
    assert_eq!(db.clear(None).unwrap(), 1);
    assert!(db.list(None).unwrap().is_empty());
}

#[test]
fn synced_and_conflict_cannot_coexist() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let mut bad = item("report", 1);
    bad.synced = true;
    bad.conflict = true;

    assert!(matches!(db.set(&bad), Err(crate::store::StoreError::InvalidItem { .. })));

    // The table enforces it too
    let raw = db.conn.execute(
        "INSERT INTO offline_items (id, type, payload, created_at, synced, conflict)
         VALUES ('x', 'report', '{}', 1, 1, 1)",
        [],
    );
    assert!(raw.is_err());
}

#[test]
fn set_many_is_atomic() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let good = item("report", 1);
    let mut bad = item("report", 2);
    bad.synced = true;
    bad.conflict = true;

    assert!(db.set_many(&[good, bad]).is_err());
    assert!(db.list(None).unwrap().is_empty());
}

#[test]
fn delete_synced_keeps_pending() {
    let mut db = SqliteBackend::open_in_memory().unwrap();
    let mut done = item("report", 1);
    done.mark_synced();
    let pending = item("report", 2);
    db.set_many(&[done, pending.clone()]).unwrap();

    assert_eq!(db.delete_synced().unwrap(), 1);
    assert_eq!(db.list(None).unwrap(), vec![pending]);
}

#[test]
fn migration_adds_last_error_column() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO offline_items (id, type, payload, created_at) VALUES ('old_1_aa', 'report', '{\"n\":1}', 5)",
            [],
        )
        .unwrap();
    }

    let db = SqliteBackend::open(&path).unwrap();
    let migrated = db.get("old_1_aa").unwrap().unwrap();
    assert_eq!(migrated.payload, json!({"n": 1}));
    assert_eq!(migrated.last_error, None);
    assert!(migrated.is_pending());
}

#[test]
fn open_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/deeper/offline.db");
    SqliteBackend::open(&path).unwrap();
    assert!(path.exists());
}
