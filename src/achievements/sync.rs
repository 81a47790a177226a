//! Achievement sync engine
//!
//! Reconciles the definition catalog against live activity, streak, and
//! ledger state into per-user progress rows plus an append-only event
//! log. Sync reads its sources as pure inputs and never mutates them.
//!
//! Each definition syncs in its own immediate transaction; the unlock
//! write is a conditional `UPDATE ... WHERE unlocked = 0`, so even two
//! racing syncs for the same user produce exactly one `UNLOCKED` event.

use rusqlite::{Connection, TransactionBehavior};

use super::{catalog, metrics};
use crate::db::{now_ms, Db};
use crate::error::{EngineError, Result};
use crate::models::{
    AchievementCategory, AchievementDefinition, AchievementEvent, AchievementEventType,
    AchievementView, MetricType, SyncOutcome, UserAchievement,
};

#[derive(Clone)]
pub struct AchievementSyncEngine {
    db: Db,
}

impl AchievementSyncEngine {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert any missing built-in definitions (run at startup)
    pub fn seed_defaults(&self) -> Result<()> {
        let conn = self.db.conn();
        catalog::seed_defaults(&conn)?;
        Ok(())
    }

    // ========================================
    // CATALOG
    // ========================================

    /// Active definitions, optionally filtered by category
    pub fn get_definitions(
        &self,
        category: Option<AchievementCategory>,
    ) -> Result<Vec<AchievementDefinition>> {
        let conn = self.db.conn();
        load_definitions(&conn, category)
    }

    /// Look up one definition by id (active or not)
    pub fn get_definition(&self, id: i64) -> Result<AchievementDefinition> {
        let conn = self.db.conn();
        conn.query_row(
            r#"SELECT id, code, name, category, metric_type, target_value, is_active
               FROM achievement_definitions WHERE id = ?1"#,
            [id],
            definition_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::not_found("definition", id.to_string())
            }
            other => EngineError::Storage(other),
        })
    }

    /// Administratively add a catalog definition
    pub fn add_definition(
        &self,
        code: &str,
        name: &str,
        category: AchievementCategory,
        metric_type: MetricType,
        target_value: i64,
    ) -> Result<AchievementDefinition> {
        if code.is_empty() {
            return Err(EngineError::Validation("code must not be empty".into()));
        }
        if target_value < 1 {
            return Err(EngineError::Validation(format!(
                "target_value must be positive, got {target_value}"
            )));
        }
        let conn = self.db.conn();
        conn.execute(
            r#"INSERT INTO achievement_definitions
               (code, name, category, metric_type, target_value, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5, 1)"#,
            rusqlite::params![code, name, category.as_str(), metric_type.as_str(), target_value],
        )?;
        let id = conn.last_insert_rowid();
        Ok(AchievementDefinition {
            id,
            code: code.to_string(),
            name: name.to_string(),
            category,
            metric_type,
            target_value,
            is_active: true,
        })
    }

    /// Toggle a definition in or out of the active catalog
    pub fn set_definition_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE achievement_definitions SET is_active = ?1 WHERE id = ?2",
            rusqlite::params![active, id],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("definition", id.to_string()));
        }
        Ok(())
    }

    // ========================================
    // SYNC
    // ========================================

    /// Sync one definition for one user.
    ///
    /// Find-or-creates the progress row, resolves the current metric
    /// value, appends a `PROGRESS` event when the value rose, and flips
    /// `unlocked` (plus an `UNLOCKED` event) at most once when the target
    /// is reached. Ordinary sync never lowers `progress_value`.
    pub fn sync_achievement_for_user(
        &self,
        user_id: &str,
        definition: &AchievementDefinition,
    ) -> Result<SyncOutcome> {
        if user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }

        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"INSERT OR IGNORE INTO user_achievements
               (user_id, definition_id, progress_value, progress_denominator)
               VALUES (?1, ?2, 0, ?3)"#,
            rusqlite::params![user_id, definition.id, definition.target_value],
        )?;

        let (row_id, stored_value, mut unlocked, mut unlocked_at): (i64, i64, bool, Option<i64>) =
            tx.query_row(
                r#"SELECT id, progress_value, unlocked, unlocked_at
                   FROM user_achievements WHERE user_id = ?1 AND definition_id = ?2"#,
                rusqlite::params![user_id, definition.id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )?;

        let current = metrics::resolve(&tx, definition.metric_type, user_id)?;
        let now = now_ms();

        let progress = if current > stored_value {
            tx.execute(
                r#"UPDATE user_achievements
                   SET progress_value = ?1, last_source_type = ?2, last_source_id = NULL
                   WHERE id = ?3"#,
                rusqlite::params![current, definition.metric_type.as_str(), row_id],
            )?;
            append_event(
                &tx,
                row_id,
                AchievementEventType::Progress,
                Some(current - stored_value),
                current,
                definition.metric_type,
                now,
            )?;
            current
        } else {
            stored_value
        };

        let mut just_unlocked = false;
        if progress >= definition.target_value && !unlocked {
            // Conditional write is the exactly-once guard under
            // concurrent syncs of the same row.
            let changed = tx.execute(
                "UPDATE user_achievements SET unlocked = 1, unlocked_at = ?1 WHERE id = ?2 AND unlocked = 0",
                rusqlite::params![now, row_id],
            )?;
            if changed == 1 {
                just_unlocked = true;
                unlocked = true;
                unlocked_at = Some(now);
                append_event(
                    &tx,
                    row_id,
                    AchievementEventType::Unlocked,
                    None,
                    progress,
                    definition.metric_type,
                    now,
                )?;
                tracing::info!(
                    user = %user_id,
                    code = %definition.code,
                    progress,
                    "achievement unlocked"
                );
            }
        }

        tx.commit()?;

        Ok(SyncOutcome {
            definition_id: definition.id,
            code: definition.code.clone(),
            progress_value: progress,
            unlocked,
            unlocked_at,
            just_unlocked,
        })
    }

    /// Sync every active definition (optionally one category) for a user.
    ///
    /// Definitions are isolated from each other: a failure on one is
    /// logged and skipped, the rest still run. Result order is
    /// unspecified.
    pub fn sync_all_achievements_for_user(
        &self,
        user_id: &str,
        category: Option<AchievementCategory>,
    ) -> Result<Vec<SyncOutcome>> {
        let definitions = self.get_definitions(category)?;
        let mut outcomes = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            match self.sync_achievement_for_user(user_id, definition) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(
                        user = %user_id,
                        code = %definition.code,
                        error = %e,
                        "achievement sync failed for definition, continuing"
                    );
                }
            }
        }
        Ok(outcomes)
    }

    // ========================================
    // READ SIDE
    // ========================================

    /// Read-only projection of the catalog joined with the user's
    /// progress rows; definitions the user never synced appear with
    /// zero-valued defaults. Creates nothing.
    pub fn get_user_achievements(
        &self,
        user_id: &str,
        category: Option<AchievementCategory>,
    ) -> Result<Vec<AchievementView>> {
        let conn = self.db.conn();
        let sql = format!(
            r#"SELECT d.id, d.code, d.name, d.category, d.metric_type, d.target_value, d.is_active,
                      ua.progress_value, ua.progress_denominator, ua.unlocked, ua.unlocked_at,
                      ua.last_source_type, ua.last_source_id
               FROM achievement_definitions d
               LEFT JOIN user_achievements ua
                   ON ua.definition_id = d.id AND ua.user_id = ?1
               WHERE d.is_active = 1{}
               ORDER BY d.id"#,
            if category.is_some() { " AND d.category = ?2" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<AchievementView> {
            let definition = definition_from_row(row)?;
            let target = definition.target_value;
            Ok(AchievementView {
                progress_value: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
                progress_denominator: row.get::<_, Option<i64>>(8)?.unwrap_or(target),
                unlocked: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
                unlocked_at: row.get(10)?,
                last_source_type: row.get(11)?,
                last_source_id: row.get(12)?,
                definition,
            })
        };

        let rows = match category {
            Some(cat) => stmt.query_map(rusqlite::params![user_id, cat.as_str()], map_row)?,
            None => stmt.query_map(rusqlite::params![user_id], map_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Full audit trail for one (user, definition) pair, oldest first
    pub fn get_events(&self, user_id: &str, definition_id: i64) -> Result<Vec<AchievementEvent>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            r#"SELECT e.id, e.user_achievement_id, e.event_type, e.delta, e.snapshot_value,
                      e.source_type, e.source_id, e.created_at
               FROM achievement_events e
               JOIN user_achievements ua ON ua.id = e.user_achievement_id
               WHERE ua.user_id = ?1 AND ua.definition_id = ?2
               ORDER BY e.id"#,
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id, definition_id], |row| {
            let event_type: String = row.get(2)?;
            let event_type = AchievementEventType::parse(&event_type).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown event type: {event_type}").into(),
                )
            })?;
            Ok(AchievementEvent {
                id: row.get(0)?,
                user_achievement_id: row.get(1)?,
                event_type,
                delta: row.get(3)?,
                snapshot_value: row.get(4)?,
                source_type: row.get(5)?,
                source_id: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================
    // ADMIN
    // ========================================

    /// Administrative RESET: zero the progress value and append a RESET
    /// event. `unlocked`/`unlocked_at` are left untouched; this is the
    /// one sanctioned way progress may decrease.
    pub fn reset_achievement(&self, user_id: &str, definition_id: i64) -> Result<UserAchievement> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                r#"SELECT id, progress_value FROM user_achievements
                   WHERE user_id = ?1 AND definition_id = ?2"#,
                rusqlite::params![user_id, definition_id],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => EngineError::not_found(
                    "user achievement",
                    format!("{user_id}/{definition_id}"),
                ),
                other => EngineError::Storage(other),
            })?;
        let (row_id, old_value) = row;

        tx.execute(
            "UPDATE user_achievements SET progress_value = 0 WHERE id = ?1",
            [row_id],
        )?;
        tx.execute(
            r#"INSERT INTO achievement_events
               (user_achievement_id, event_type, delta, snapshot_value, created_at)
               VALUES (?1, 'RESET', ?2, 0, ?3)"#,
            rusqlite::params![row_id, -old_value, now_ms()],
        )?;

        let updated = tx.query_row(
            r#"SELECT id, user_id, definition_id, progress_value, progress_denominator,
                      unlocked, unlocked_at, last_source_type, last_source_id
               FROM user_achievements WHERE id = ?1"#,
            [row_id],
            |r| {
                Ok(UserAchievement {
                    id: r.get(0)?,
                    user_id: r.get(1)?,
                    definition_id: r.get(2)?,
                    progress_value: r.get(3)?,
                    progress_denominator: r.get(4)?,
                    unlocked: r.get(5)?,
                    unlocked_at: r.get(6)?,
                    last_source_type: r.get(7)?,
                    last_source_id: r.get(8)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(updated)
    }
}

fn load_definitions(
    conn: &Connection,
    category: Option<AchievementCategory>,
) -> Result<Vec<AchievementDefinition>> {
    let sql = format!(
        r#"SELECT id, code, name, category, metric_type, target_value, is_active
           FROM achievement_definitions WHERE is_active = 1{} ORDER BY id"#,
        if category.is_some() { " AND category = ?1" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = match category {
        Some(cat) => stmt.query_map([cat.as_str()], definition_from_row)?,
        None => stmt.query_map([], definition_from_row)?,
    };
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn definition_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AchievementDefinition> {
    let category: String = row.get(3)?;
    let category = AchievementCategory::parse(&category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown category: {category}").into(),
        )
    })?;
    let metric_type: String = row.get(4)?;
    let metric_type = MetricType::parse(&metric_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown metric type: {metric_type}").into(),
        )
    })?;
    Ok(AchievementDefinition {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        category,
        metric_type,
        target_value: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn append_event(
    conn: &Connection,
    row_id: i64,
    event_type: AchievementEventType,
    delta: Option<i64>,
    snapshot: i64,
    metric: MetricType,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO achievement_events
           (user_achievement_id, event_type, delta, snapshot_value, source_type, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        rusqlite::params![row_id, event_type.as_str(), delta, snapshot, metric.as_str(), now],
    )?;
    Ok(())
}
