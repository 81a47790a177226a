//! SQLite database connection and schema management
//!
//! Manages the `~/.momentum/momentum.db` database with automatic schema
//! migration. A single connection behind a mutex serializes every
//! read-modify-write in the process; writers additionally run inside
//! `BEGIN IMMEDIATE` transactions so balance and streak updates hold the
//! database write lock for the full read-compute-write.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current timestamp in UTC epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Database wrapper shared by every engine service
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL for concurrent readers alongside the single writer
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Get the connection guard (callers may open transactions on it)
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("DB lock poisoned")
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()?;
        Ok(())
    }

    /// Run any pending migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: enforce idempotent awarding at the storage layer
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_ref_unique
                    ON ledger_entries(ref_type, ref_id)
                    WHERE ref_type IS NOT NULL AND ref_id IS NOT NULL;
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        Ok(())
    }

    /// Delete all recorded activity (attendance, workouts, body metrics)
    pub fn reset_activity(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            DELETE FROM activity_events;
            DELETE FROM body_metrics;
            "#,
        )?;
        Ok(())
    }

    /// Delete all progression state (ledger, streaks, achievement progress)
    pub fn reset_progression(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            DELETE FROM achievement_events;
            DELETE FROM user_achievements;
            DELETE FROM ledger_entries;
            DELETE FROM streaks;
            UPDATE users SET balance = 0;
            "#,
        )?;
        Ok(())
    }
}

/// SQL schema
const SCHEMA_SQL: &str = r#"
-- Users: cached balance only; ledger_entries is the source of truth
-- and TokenLedger is the only writer of this column.
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    balance INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- Append-only token movements (one row per balance change)
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    delta INTEGER NOT NULL,
    reason TEXT NOT NULL,
    ref_type TEXT,
    ref_id TEXT,
    balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries(user_id, id);
CREATE INDEX IF NOT EXISTS idx_ledger_ref ON ledger_entries(ref_type, ref_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_ref_unique
    ON ledger_entries(ref_type, ref_id)
    WHERE ref_type IS NOT NULL AND ref_id IS NOT NULL;

-- Weekly attendance streaks, one row per user
CREATE TABLE IF NOT EXISTS streaks (
    user_id TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0,
    last_value INTEGER NOT NULL DEFAULT 0,
    max_value INTEGER NOT NULL DEFAULT 0,
    recovery_items INTEGER NOT NULL DEFAULT 0 CHECK (recovery_items >= 0),
    last_assistance_at INTEGER
);

-- Achievement catalog (immutable at runtime, seeded at startup)
CREATE TABLE IF NOT EXISTS achievement_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    metric_type TEXT NOT NULL,
    target_value INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

-- One progress row per (user, definition), created lazily on first sync
CREATE TABLE IF NOT EXISTS user_achievements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    definition_id INTEGER NOT NULL REFERENCES achievement_definitions(id),
    progress_value INTEGER NOT NULL DEFAULT 0,
    progress_denominator INTEGER NOT NULL,
    unlocked INTEGER NOT NULL DEFAULT 0,
    unlocked_at INTEGER,
    last_source_type TEXT,
    last_source_id TEXT,
    UNIQUE (user_id, definition_id)
);
CREATE INDEX IF NOT EXISTS idx_user_achievements_user ON user_achievements(user_id);

-- Append-only audit trail for progress rows (never updated or deleted)
CREATE TABLE IF NOT EXISTS achievement_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_achievement_id INTEGER NOT NULL REFERENCES user_achievements(id),
    event_type TEXT NOT NULL,
    delta INTEGER,
    snapshot_value INTEGER NOT NULL,
    source_type TEXT,
    source_id TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_achievement_events_row
    ON achievement_events(user_achievement_id, id);

-- Activity signals recorded by business flows, read by metric resolvers
CREATE TABLE IF NOT EXISTS activity_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    occurred_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_user_kind ON activity_events(user_id, kind);

-- Body weight history (first vs latest drives the body-progress metric)
CREATE TABLE IF NOT EXISTS body_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    weight_kg REAL NOT NULL,
    recorded_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_body_metrics_user ON body_metrics(user_id, recorded_at);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (2);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_and_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_momentum.db");
        let db = Db::open(&db_path).unwrap();

        let conn = db.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"ledger_entries".to_string()));
        assert!(tables.contains(&"streaks".to_string()));
        assert!(tables.contains(&"user_achievements".to_string()));
        assert!(tables.contains(&"achievement_events".to_string()));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_momentum.db");
        drop(Db::open(&db_path).unwrap());
        // Second open re-runs schema + migrations without error
        let db = Db::open(&db_path).unwrap();
        let version: i32 = db
            .conn()
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
