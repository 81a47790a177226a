//! Token ledger - the single writer of user balances
//!
//! Every balance change is recorded as an immutable `ledger_entries` row
//! carrying the resulting balance, and the cached `users.balance` column
//! is updated in the same transaction. The read-compute-write runs under
//! the connection mutex inside a `BEGIN IMMEDIATE` transaction, so two
//! concurrent movements for one user can never read the same stale
//! balance.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::{now_ms, Db};
use crate::error::{codes, EngineError, Result};
use crate::models::{LedgerEntry, Movement, MovementReason};

/// A requested balance change
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub user_id: String,
    pub delta: i64,
    pub reason: MovementReason,
    /// Optional pointer to the business record that caused the movement
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
}

impl MovementRequest {
    pub fn new(user_id: impl Into<String>, delta: i64, reason: MovementReason) -> Self {
        Self {
            user_id: user_id.into(),
            delta,
            reason,
            ref_type: None,
            ref_id: None,
        }
    }

    pub fn with_ref(mut self, ref_type: impl Into<String>, ref_id: impl Into<String>) -> Self {
        self.ref_type = Some(ref_type.into());
        self.ref_id = Some(ref_id.into());
        self
    }
}

/// Append-only ledger over the shared database
#[derive(Clone)]
pub struct TokenLedger {
    db: Db,
}

impl TokenLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Register a balance movement in its own transaction.
    ///
    /// Fails with `InsufficientBalance` (writing nothing) if the movement
    /// would take the balance below zero, and with `DUPLICATE_MOVEMENT`
    /// if `(ref_type, ref_id)` was already awarded.
    pub fn register_movement(&self, req: &MovementRequest) -> Result<Movement> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let movement = Self::register_movement_in(&tx, req)?;
        tx.commit()?;
        Ok(movement)
    }

    /// Register a movement inside a caller-held transaction.
    ///
    /// Lets a business flow compose "finish workout, then award tokens"
    /// as one unit of work: both commit or both roll back.
    pub fn register_movement_in(conn: &Connection, req: &MovementRequest) -> Result<Movement> {
        if req.user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }

        let now = now_ms();
        conn.execute(
            "INSERT OR IGNORE INTO users (id, balance, created_at) VALUES (?1, 0, ?2)",
            (&req.user_id, now),
        )?;

        let previous_balance: i64 = conn.query_row(
            "SELECT balance FROM users WHERE id = ?1",
            [&req.user_id],
            |r| r.get(0),
        )?;

        let new_balance = previous_balance + req.delta;
        if new_balance < 0 {
            return Err(EngineError::InsufficientBalance {
                balance: previous_balance,
                delta: req.delta,
            });
        }

        let inserted = conn.execute(
            r#"INSERT INTO ledger_entries
               (user_id, delta, reason, ref_type, ref_id, balance_after, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            rusqlite::params![
                req.user_id,
                req.delta,
                req.reason.as_str(),
                req.ref_type,
                req.ref_id,
                new_balance,
                now,
            ],
        );
        if let Err(e) = inserted {
            return Err(map_duplicate(e, req));
        }
        let entry_id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE users SET balance = ?1 WHERE id = ?2",
            rusqlite::params![new_balance, req.user_id],
        )?;

        tracing::debug!(
            user = %req.user_id,
            delta = req.delta,
            reason = req.reason.as_str(),
            balance = new_balance,
            "token movement registered"
        );

        Ok(Movement {
            previous_balance,
            new_balance,
            entry: LedgerEntry {
                id: entry_id,
                user_id: req.user_id.clone(),
                delta: req.delta,
                reason: req.reason,
                ref_type: req.ref_type.clone(),
                ref_id: req.ref_id.clone(),
                balance_after: new_balance,
                created_at: now,
            },
        })
    }

    /// Current cached balance; `0` for unknown users so summary reads
    /// never hard-fail on a missing profile.
    pub fn get_balance(&self, user_id: &str) -> Result<i64> {
        let conn = self.db.conn();
        let balance = conn
            .query_row(
                "SELECT balance FROM users WHERE id = ?1",
                [user_id],
                |r| r.get(0),
            )
            .unwrap_or(0);
        Ok(balance)
    }

    /// Paginated movement history, most recent first
    pub fn get_history(&self, user_id: &str, limit: u32, offset: u32) -> Result<Vec<LedgerEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, delta, reason, ref_type, ref_id, balance_after, created_at
               FROM ledger_entries WHERE user_id = ?1
               ORDER BY id DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id, limit, offset],
            entry_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Whether a movement with this business reference was already
    /// recorded. Callers can use this as a cheap pre-check; the unique
    /// index on `(ref_type, ref_id)` is what actually guarantees
    /// idempotency.
    pub fn exists_movement(&self, ref_type: &str, ref_id: &str) -> Result<bool> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE ref_type = ?1 AND ref_id = ?2",
            [ref_type, ref_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }
}

fn map_duplicate(e: rusqlite::Error, req: &MovementRequest) -> EngineError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if let (Some(rt), Some(ri)) = (&req.ref_type, &req.ref_id) {
                return EngineError::business(
                    codes::DUPLICATE_MOVEMENT,
                    format!("movement for {rt}/{ri} already recorded"),
                );
            }
        }
    }
    EngineError::Storage(e)
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let reason: String = row.get(3)?;
    let reason = MovementReason::parse(&reason).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown movement reason: {reason}").into(),
        )
    })?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        delta: row.get(2)?,
        reason,
        ref_type: row.get(4)?,
        ref_id: row.get(5)?,
        balance_after: row.get(6)?,
        created_at: row.get(7)?,
    })
}
