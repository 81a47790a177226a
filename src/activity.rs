//! Activity recording - the write side of the metric sources
//!
//! Business flows (attendance, workouts, routines, challenges, personal
//! records, onboarding) append rows here; the achievement metric
//! resolvers read them back as per-user counts. Writes are strict plain
//! inserts.

use crate::db::{now_ms, Db};
use crate::error::{EngineError, Result};
use crate::models::ActivityKind;

#[derive(Clone)]
pub struct ActivityRecorder {
    db: Db,
}

impl ActivityRecorder {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn record_attendance(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::Attendance)
    }

    pub fn record_workout(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::Workout)
    }

    pub fn record_routine(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::Routine)
    }

    pub fn record_challenge(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::Challenge)
    }

    pub fn record_personal_record(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::PersonalRecord)
    }

    pub fn record_onboarding_step(&self, user_id: &str) -> Result<()> {
        self.record(user_id, ActivityKind::OnboardingStep)
    }

    pub fn record(&self, user_id: &str, kind: ActivityKind) -> Result<()> {
        if user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO activity_events (user_id, kind, occurred_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, kind.as_str(), now_ms()],
        )?;
        Ok(())
    }

    /// Append a body-weight sample (kilograms)
    pub fn record_body_weight(&self, user_id: &str, weight_kg: f64) -> Result<()> {
        if user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }
        if !weight_kg.is_finite() || weight_kg <= 0.0 {
            return Err(EngineError::Validation(format!(
                "weight_kg must be a positive number, got {weight_kg}"
            )));
        }
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO body_metrics (user_id, weight_kg, recorded_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, weight_kg, now_ms()],
        )?;
        Ok(())
    }

    /// Lifetime count of one activity kind for a user
    pub fn count(&self, user_id: &str, kind: ActivityKind) -> Result<i64> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_events WHERE user_id = ?1 AND kind = ?2",
            [user_id, kind.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }
}
