//! Metric resolvers
//!
//! Each `MetricType` variant maps to one pure `user_id -> i64` query;
//! the match is exhaustive, so a new variant without a resolver is a
//! compile error rather than a silent no-op. Resolvers read live state
//! (streaks, ledger, activity) and never mutate anything; users with no
//! matching rows resolve to `0`.

use rusqlite::{Connection, OptionalExtension};

use crate::models::MetricType;

/// Resolve the current value of a metric for a user
pub fn resolve(conn: &Connection, metric: MetricType, user_id: &str) -> rusqlite::Result<i64> {
    match metric {
        MetricType::StreakLength => streak_value(conn, user_id),
        MetricType::AttendanceTotal => activity_count(conn, user_id, "attendance"),
        MetricType::WorkoutsCompleted => activity_count(conn, user_id, "workout"),
        MetricType::RoutinesCompleted => activity_count(conn, user_id, "routine"),
        MetricType::ChallengesCompleted => activity_count(conn, user_id, "challenge"),
        MetricType::PersonalRecordCount => activity_count(conn, user_id, "personal_record"),
        MetricType::OnboardingSteps => activity_count(conn, user_id, "onboarding_step"),
        MetricType::BodyWeightProgress => body_weight_progress(conn, user_id),
        MetricType::TokenBalance => token_balance(conn, user_id),
        MetricType::TokensEarnedTotal => tokens_earned(conn, user_id),
        MetricType::TokensSpentTotal => tokens_spent(conn, user_id),
    }
}

fn streak_value(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM streaks WHERE user_id = ?1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

fn activity_count(conn: &Connection, user_id: &str, kind: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM activity_events WHERE user_id = ?1 AND kind = ?2",
        [user_id, kind],
        |r| r.get(0),
    )
}

fn token_balance(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    let balance: Option<i64> = conn
        .query_row(
            "SELECT balance FROM users WHERE id = ?1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0))
}

fn tokens_earned(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(delta), 0) FROM ledger_entries WHERE user_id = ?1 AND delta > 0",
        [user_id],
        |r| r.get(0),
    )
}

fn tokens_spent(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(-delta), 0) FROM ledger_entries WHERE user_id = ?1 AND delta < 0",
        [user_id],
        |r| r.get(0),
    )
}

/// Whole-kilogram distance between the first and latest recorded weight;
/// 0 with fewer than two samples. Direction-agnostic so cutting and
/// bulking goals both accumulate progress.
fn body_weight_progress(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    let first: Option<f64> = conn
        .query_row(
            "SELECT weight_kg FROM body_metrics WHERE user_id = ?1 ORDER BY recorded_at ASC, id ASC LIMIT 1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    let latest: Option<f64> = conn
        .query_row(
            "SELECT weight_kg FROM body_metrics WHERE user_id = ?1 ORDER BY recorded_at DESC, id DESC LIMIT 1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM body_metrics WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?;
    if count < 2 {
        return Ok(0);
    }

    match (first, latest) {
        (Some(first), Some(latest)) => Ok((first - latest).abs().round() as i64),
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::ledger::{MovementRequest, TokenLedger};
    use crate::models::MovementReason;

    #[test]
    fn unknown_user_resolves_every_metric_to_zero() {
        let db = Db::open_in_memory().unwrap();
        let conn = db.conn();
        let all = [
            MetricType::StreakLength,
            MetricType::AttendanceTotal,
            MetricType::WorkoutsCompleted,
            MetricType::RoutinesCompleted,
            MetricType::ChallengesCompleted,
            MetricType::PersonalRecordCount,
            MetricType::BodyWeightProgress,
            MetricType::TokenBalance,
            MetricType::TokensEarnedTotal,
            MetricType::TokensSpentTotal,
            MetricType::OnboardingSteps,
        ];
        for metric in all {
            assert_eq!(resolve(&conn, metric, "ghost").unwrap(), 0, "{metric:?}");
        }
    }

    #[test]
    fn token_metrics_split_earned_and_spent() {
        let db = Db::open_in_memory().unwrap();
        let ledger = TokenLedger::new(db.clone());
        ledger
            .register_movement(&MovementRequest::new("u1", 100, MovementReason::WorkoutReward))
            .unwrap();
        ledger
            .register_movement(&MovementRequest::new("u1", 50, MovementReason::ReviewReward))
            .unwrap();
        ledger
            .register_movement(&MovementRequest::new("u1", -40, MovementReason::RewardClaim))
            .unwrap();

        let conn = db.conn();
        assert_eq!(resolve(&conn, MetricType::TokenBalance, "u1").unwrap(), 110);
        assert_eq!(resolve(&conn, MetricType::TokensEarnedTotal, "u1").unwrap(), 150);
        assert_eq!(resolve(&conn, MetricType::TokensSpentTotal, "u1").unwrap(), 40);
    }

    #[test]
    fn body_weight_progress_needs_two_samples() {
        let db = Db::open_in_memory().unwrap();
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO body_metrics (user_id, weight_kg, recorded_at) VALUES ('u1', 90.0, 1)",
                [],
            )
            .unwrap();
            assert_eq!(resolve(&conn, MetricType::BodyWeightProgress, "u1").unwrap(), 0);
            conn.execute(
                "INSERT INTO body_metrics (user_id, weight_kg, recorded_at) VALUES ('u1', 84.6, 2)",
                [],
            )
            .unwrap();
            assert_eq!(resolve(&conn, MetricType::BodyWeightProgress, "u1").unwrap(), 5);
        }
    }
}
