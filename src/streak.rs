//! Weekly attendance streaks with break/recovery semantics
//!
//! A streak row is created at onboarding and never deleted. The three
//! ordinary transitions are: continue (`value += 1`), covered break
//! (spend one recovery item, `value` untouched), and uncovered break
//! (`last_value = value`, `value = 1` - the missed week starts a new
//! streak at day one). The administrative `reset_streak` sets `value`
//! to `0` instead; the two reset targets intentionally differ, see the
//! method docs.

use rusqlite::TransactionBehavior;

use crate::db::{now_ms, Db};
use crate::error::{codes, EngineError, Result};
use crate::models::{Streak, StreakTransition};

/// Administrative field overrides, bypassing the transition rules
#[derive(Debug, Clone, Copy, Default)]
pub struct StreakOverride {
    pub value: Option<i64>,
    pub last_value: Option<i64>,
    pub recovery_items: Option<i64>,
}

#[derive(Clone)]
pub struct StreakTracker {
    db: Db,
}

impl StreakTracker {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Find-or-create the streak row for a user (onboarding entry point)
    pub fn create_streak(&self, user_id: &str) -> Result<Streak> {
        if user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }
        {
            let conn = self.db.conn();
            conn.execute(
                "INSERT OR IGNORE INTO streaks (user_id) VALUES (?1)",
                [user_id],
            )?;
        }
        self.get_user_streak(user_id)
    }

    pub fn get_user_streak(&self, user_id: &str) -> Result<Streak> {
        let conn = self.db.conn();
        load_streak(&conn, user_id)
    }

    /// Apply one weekly transition.
    ///
    /// `continued = true` extends the streak; `continued = false` breaks
    /// it, consuming a recovery item if one is available.
    pub fn update_streak(&self, user_id: &str, continued: bool) -> Result<(Streak, StreakTransition)> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut streak = load_streak(&tx, user_id)?;
        let transition = if continued {
            streak.value += 1;
            if streak.value > streak.max_value {
                streak.max_value = streak.value;
            }
            streak.last_assistance_at = Some(now_ms());
            StreakTransition::Continued
        } else if streak.recovery_items > 0 {
            streak.recovery_items -= 1;
            StreakTransition::BreakCovered
        } else {
            streak.last_value = streak.value;
            streak.value = 1;
            StreakTransition::BreakReset
        };

        store_streak(&tx, &streak)?;
        tx.commit()?;

        tracing::debug!(
            user = %user_id,
            value = streak.value,
            recovery_items = streak.recovery_items,
            transition = ?transition,
            "streak updated"
        );
        Ok((streak, transition))
    }

    /// Spend one recovery item without touching the streak value.
    ///
    /// Fails with `NO_RECOVERY_ITEMS` when none are left.
    pub fn use_recovery_item(&self, user_id: &str) -> Result<Streak> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut streak = load_streak(&tx, user_id)?;
        if streak.recovery_items == 0 {
            return Err(EngineError::business(
                codes::NO_RECOVERY_ITEMS,
                format!("user {user_id} has no recovery items"),
            ));
        }
        streak.recovery_items -= 1;
        store_streak(&tx, &streak)?;
        tx.commit()?;
        Ok(streak)
    }

    /// Administrative reset: `last_value = value`, `value = 0`.
    ///
    /// Distinct from the uncovered-break transition, which resets to `1`
    /// because the breaking week itself counts as week one. The `0` here
    /// is the observed administrative behavior and is kept as-is.
    pub fn reset_streak(&self, user_id: &str) -> Result<Streak> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut streak = load_streak(&tx, user_id)?;
        streak.last_value = streak.value;
        streak.value = 0;
        store_streak(&tx, &streak)?;
        tx.commit()?;
        Ok(streak)
    }

    /// Add recovery items (default grant is one); no upper bound.
    pub fn grant_recovery_items(&self, user_id: &str, count: i64) -> Result<Streak> {
        if count < 1 {
            return Err(EngineError::Validation(format!(
                "grant count must be positive, got {count}"
            )));
        }
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut streak = load_streak(&tx, user_id)?;
        streak.recovery_items += count;
        store_streak(&tx, &streak)?;
        tx.commit()?;
        Ok(streak)
    }

    /// Directly set streak fields for administrative correction.
    ///
    /// Bypasses the transition rules; `max_value` is still raised when a
    /// written `value` exceeds it so the historical-max invariant holds.
    pub fn override_streak(&self, user_id: &str, patch: StreakOverride) -> Result<Streak> {
        if let Some(items) = patch.recovery_items {
            if items < 0 {
                return Err(EngineError::Validation(format!(
                    "recovery_items must be non-negative, got {items}"
                )));
            }
        }
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut streak = load_streak(&tx, user_id)?;
        if let Some(value) = patch.value {
            streak.value = value;
            if streak.value > streak.max_value {
                streak.max_value = streak.value;
            }
        }
        if let Some(last_value) = patch.last_value {
            streak.last_value = last_value;
        }
        if let Some(items) = patch.recovery_items {
            streak.recovery_items = items;
        }
        store_streak(&tx, &streak)?;
        tx.commit()?;
        Ok(streak)
    }
}

fn load_streak(conn: &rusqlite::Connection, user_id: &str) -> Result<Streak> {
    conn.query_row(
        r#"SELECT user_id, value, last_value, max_value, recovery_items, last_assistance_at
           FROM streaks WHERE user_id = ?1"#,
        [user_id],
        |r| {
            Ok(Streak {
                user_id: r.get(0)?,
                value: r.get(1)?,
                last_value: r.get(2)?,
                max_value: r.get(3)?,
                recovery_items: r.get(4)?,
                last_assistance_at: r.get(5)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => EngineError::not_found("streak", user_id),
        other => EngineError::Storage(other),
    })
}

fn store_streak(conn: &rusqlite::Connection, streak: &Streak) -> Result<()> {
    conn.execute(
        r#"UPDATE streaks
           SET value = ?2, last_value = ?3, max_value = ?4,
               recovery_items = ?5, last_assistance_at = ?6
           WHERE user_id = ?1"#,
        rusqlite::params![
            streak.user_id,
            streak.value,
            streak.last_value,
            streak.max_value,
            streak.recovery_items,
            streak.last_assistance_at,
        ],
    )?;
    Ok(())
}
