// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite backend for the offline store.

use std::path::Path;

use fl_core::OfflineItem;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{check_item, ItemBackend, StoreResult};

/// SQL schema for the offline item table.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS offline_items (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    synced INTEGER NOT NULL DEFAULT 0,
    conflict INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    CHECK (NOT (synced = 1 AND conflict = 1))
);

CREATE INDEX IF NOT EXISTS idx_offline_items_type ON offline_items(type);
CREATE INDEX IF NOT EXISTS idx_offline_items_created ON offline_items(created_at);
"#;

const COLUMNS: &str =
    "id, type, payload, created_at, version, synced, conflict, retry_count, last_error";

/// Applies the schema and idempotent migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_last_error(conn)?;
    Ok(())
}

/// Migration: stores written before failure reasons were kept lack `last_error`.
fn migrate_add_last_error(conn: &Connection) -> StoreResult<()> {
    let has_column: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('offline_items') WHERE name = 'last_error'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !has_column {
        conn.execute("ALTER TABLE offline_items ADD COLUMN last_error TEXT", [])?;
    }
    Ok(())
}

/// Row as stored, before the payload is decoded.
struct RawItem {
    id: String,
    item_type: String,
    payload: String,
    created_at: i64,
    version: u32,
    synced: bool,
    conflict: bool,
    retry_count: u32,
    last_error: Option<String>,
}

impl RawItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawItem {
            id: row.get(0)?,
            item_type: row.get(1)?,
            payload: row.get(2)?,
            created_at: row.get(3)?,
            version: row.get(4)?,
            synced: row.get(5)?,
            conflict: row.get(6)?,
            retry_count: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    fn decode(self) -> StoreResult<OfflineItem> {
        Ok(OfflineItem {
            id: self.id,
            item_type: self.item_type,
            payload: serde_json::from_str(&self.payload)?,
            created_at: self.created_at.max(0) as u64,
            version: self.version,
            synced: self.synced,
            conflict: self.conflict,
            retry_count: self.retry_count,
            last_error: self.last_error,
        })
    }
}

fn upsert(conn: &Connection, item: &OfflineItem) -> StoreResult<()> {
    check_item(item)?;
    let payload = serde_json::to_string(&item.payload)?;
    conn.execute(
        "INSERT INTO offline_items (id, type, payload, created_at, version, synced,
         conflict, retry_count, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            type = excluded.type,
            payload = excluded.payload,
            created_at = excluded.created_at,
            version = excluded.version,
            synced = excluded.synced,
            conflict = excluded.conflict,
            retry_count = excluded.retry_count,
            last_error = excluded.last_error",
        params![
            item.id,
            item.item_type,
            payload,
            item.created_at as i64,
            item.version,
            item.synced,
            item.conflict,
            item.retry_count,
            item.last_error,
        ],
    )?;
    Ok(())
}

fn update_existing(conn: &Connection, item: &OfflineItem) -> StoreResult<bool> {
    check_item(item)?;
    let payload = serde_json::to_string(&item.payload)?;
    let changed = conn.execute(
        "UPDATE offline_items SET
            type = ?2,
            payload = ?3,
            created_at = ?4,
            version = ?5,
            synced = ?6,
            conflict = ?7,
            retry_count = ?8,
            last_error = ?9
         WHERE id = ?1",
        params![
            item.id,
            item.item_type,
            payload,
            item.created_at as i64,
            item.version,
            item.synced,
            item.conflict,
            item.retry_count,
            item.last_error,
        ],
    )?;
    Ok(changed > 0)
}

/// SQLite-backed item collection.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open the database at `path`, creating and migrating if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(SqliteBackend { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(SqliteBackend { conn })
    }
}

impl ItemBackend for SqliteBackend {
    fn get(&self, id: &str) -> StoreResult<Option<OfflineItem>> {
        let sql = format!("SELECT {COLUMNS} FROM offline_items WHERE id = ?1");
        let raw = self.conn.query_row(&sql, params![id], RawItem::from_row).optional()?;
        raw.map(RawItem::decode).transpose()
    }

    fn set(&mut self, item: &OfflineItem) -> StoreResult<()> {
        upsert(&self.conn, item)
    }

    fn set_many(&mut self, items: &[OfflineItem]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        for item in items {
            upsert(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update(&mut self, item: &OfflineItem) -> StoreResult<bool> {
        update_existing(&self.conn, item)
    }

    fn update_many(&mut self, items: &[OfflineItem]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        for item in items {
            if update_existing(&tx, item)? {
                updated += 1;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn delete(&mut self, id: &str) -> StoreResult<bool> {
        let removed = self.conn.execute("DELETE FROM offline_items WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn list(&self, item_type: Option<&str>) -> StoreResult<Vec<OfflineItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM offline_items
             WHERE ?1 IS NULL OR type = ?1
             ORDER BY created_at, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![item_type], RawItem::from_row)?;
        let mut items = Vec::new();
        for raw in rows {
            items.push(raw?.decode()?);
        }
        Ok(items)
    }

    fn clear(&mut self, item_type: Option<&str>) -> StoreResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM offline_items WHERE ?1 IS NULL OR type = ?1", params![item_type])?;
        Ok(removed)
    }

    fn delete_synced(&mut self) -> StoreResult<usize> {
        let removed = self.conn.execute("DELETE FROM offline_items WHERE synced = 1", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
