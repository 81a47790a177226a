//! Built-in achievement catalog
//!
//! The catalog is immutable at runtime from the sync engine's point of
//! view: definitions are seeded idempotently at startup (matched by
//! `code`) and only toggled or extended through the administrative
//! methods on the sync engine.

use rusqlite::Connection;

use crate::models::{AchievementCategory, MetricType};

/// One built-in definition
pub struct DefinitionSpec {
    pub code: &'static str,
    pub name: &'static str,
    pub category: AchievementCategory,
    pub metric_type: MetricType,
    pub target_value: i64,
}

/// Default definitions shipped with the engine
pub static DEFAULT_DEFINITIONS: &[DefinitionSpec] = &[
    // === CONSISTENCY ===
    DefinitionSpec {
        code: "streak_first_week",
        name: "Off the Couch",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::StreakLength,
        target_value: 1,
    },
    DefinitionSpec {
        code: "streak_month",
        name: "Four in a Row",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::StreakLength,
        target_value: 4,
    },
    DefinitionSpec {
        code: "streak_quarter",
        name: "Quarter Machine",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::StreakLength,
        target_value: 13,
    },
    DefinitionSpec {
        code: "streak_year",
        name: "Year of Iron",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::StreakLength,
        target_value: 52,
    },
    DefinitionSpec {
        code: "attendance_10",
        name: "Regular",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::AttendanceTotal,
        target_value: 10,
    },
    DefinitionSpec {
        code: "attendance_50",
        name: "Fixture",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::AttendanceTotal,
        target_value: 50,
    },
    DefinitionSpec {
        code: "attendance_250",
        name: "Part of the Furniture",
        category: AchievementCategory::Consistency,
        metric_type: MetricType::AttendanceTotal,
        target_value: 250,
    },
    // === TRAINING ===
    DefinitionSpec {
        code: "first_workout",
        name: "First Rep",
        category: AchievementCategory::Training,
        metric_type: MetricType::WorkoutsCompleted,
        target_value: 1,
    },
    DefinitionSpec {
        code: "workouts_25",
        name: "Warmed Up",
        category: AchievementCategory::Training,
        metric_type: MetricType::WorkoutsCompleted,
        target_value: 25,
    },
    DefinitionSpec {
        code: "workouts_100",
        name: "Hundred Club",
        category: AchievementCategory::Training,
        metric_type: MetricType::WorkoutsCompleted,
        target_value: 100,
    },
    DefinitionSpec {
        code: "routines_10",
        name: "Creature of Habit",
        category: AchievementCategory::Training,
        metric_type: MetricType::RoutinesCompleted,
        target_value: 10,
    },
    DefinitionSpec {
        code: "routines_50",
        name: "Programmed",
        category: AchievementCategory::Training,
        metric_type: MetricType::RoutinesCompleted,
        target_value: 50,
    },
    // === CHALLENGES ===
    DefinitionSpec {
        code: "challenge_first",
        name: "Challenger",
        category: AchievementCategory::Challenges,
        metric_type: MetricType::ChallengesCompleted,
        target_value: 1,
    },
    DefinitionSpec {
        code: "challenge_10",
        name: "Contender",
        category: AchievementCategory::Challenges,
        metric_type: MetricType::ChallengesCompleted,
        target_value: 10,
    },
    DefinitionSpec {
        code: "challenge_25",
        name: "Champion",
        category: AchievementCategory::Challenges,
        metric_type: MetricType::ChallengesCompleted,
        target_value: 25,
    },
    // === STRENGTH ===
    DefinitionSpec {
        code: "pr_first",
        name: "Personal Best",
        category: AchievementCategory::Strength,
        metric_type: MetricType::PersonalRecordCount,
        target_value: 1,
    },
    DefinitionSpec {
        code: "pr_10",
        name: "Record Breaker",
        category: AchievementCategory::Strength,
        metric_type: MetricType::PersonalRecordCount,
        target_value: 10,
    },
    DefinitionSpec {
        code: "pr_25",
        name: "Limit Pusher",
        category: AchievementCategory::Strength,
        metric_type: MetricType::PersonalRecordCount,
        target_value: 25,
    },
    // === BODY PROGRESS ===
    DefinitionSpec {
        code: "weight_move_2",
        name: "Moving the Needle",
        category: AchievementCategory::BodyProgress,
        metric_type: MetricType::BodyWeightProgress,
        target_value: 2,
    },
    DefinitionSpec {
        code: "weight_move_5",
        name: "Transformation",
        category: AchievementCategory::BodyProgress,
        metric_type: MetricType::BodyWeightProgress,
        target_value: 5,
    },
    DefinitionSpec {
        code: "weight_move_10",
        name: "New Person",
        category: AchievementCategory::BodyProgress,
        metric_type: MetricType::BodyWeightProgress,
        target_value: 10,
    },
    // === TOKENS ===
    DefinitionSpec {
        code: "balance_100",
        name: "Saver",
        category: AchievementCategory::Tokens,
        metric_type: MetricType::TokenBalance,
        target_value: 100,
    },
    DefinitionSpec {
        code: "balance_500",
        name: "Hoarder",
        category: AchievementCategory::Tokens,
        metric_type: MetricType::TokenBalance,
        target_value: 500,
    },
    DefinitionSpec {
        code: "earned_1000",
        name: "Token Earner",
        category: AchievementCategory::Tokens,
        metric_type: MetricType::TokensEarnedTotal,
        target_value: 1000,
    },
    DefinitionSpec {
        code: "spent_500",
        name: "Big Spender",
        category: AchievementCategory::Tokens,
        metric_type: MetricType::TokensSpentTotal,
        target_value: 500,
    },
    // === ONBOARDING ===
    DefinitionSpec {
        code: "onboarding_done",
        name: "All Set",
        category: AchievementCategory::Onboarding,
        metric_type: MetricType::OnboardingSteps,
        target_value: 5,
    },
];

/// Insert any missing built-in definitions (idempotent, matched by code)
pub fn seed_defaults(conn: &Connection) -> rusqlite::Result<()> {
    for spec in DEFAULT_DEFINITIONS {
        conn.execute(
            r#"INSERT OR IGNORE INTO achievement_definitions
               (code, name, category, metric_type, target_value, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5, 1)"#,
            rusqlite::params![
                spec.code,
                spec.name,
                spec.category.as_str(),
                spec.metric_type.as_str(),
                spec.target_value,
            ],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_targets_positive() {
        let mut codes = HashSet::new();
        for spec in DEFAULT_DEFINITIONS {
            assert!(codes.insert(spec.code), "duplicate code {}", spec.code);
            assert!(spec.target_value > 0, "{} has non-positive target", spec.code);
        }
    }

    #[test]
    fn seeding_twice_inserts_once() {
        let db = Db::open_in_memory().unwrap();
        let conn = db.conn();
        seed_defaults(&conn).unwrap();
        seed_defaults(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM achievement_definitions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, DEFAULT_DEFINITIONS.len());
    }
}
