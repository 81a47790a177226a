//! Domain models for the progression engine
//!
//! Rows mirror the storage schema in `db.rs`. Timestamps are UTC epoch
//! milliseconds throughout.

use serde::{Deserialize, Serialize};

/// Why a token movement happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    WorkoutReward,
    ChallengeReward,
    ReviewReward,
    AttendanceReward,
    RewardClaim,
    AchievementBonus,
    RecoveryPurchase,
    OnboardingBonus,
    AdminAdjust,
}

impl MovementReason {
    /// String ID for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkoutReward => "WORKOUT_REWARD",
            Self::ChallengeReward => "CHALLENGE_REWARD",
            Self::ReviewReward => "REVIEW_REWARD",
            Self::AttendanceReward => "ATTENDANCE_REWARD",
            Self::RewardClaim => "REWARD_CLAIM",
            Self::AchievementBonus => "ACHIEVEMENT_BONUS",
            Self::RecoveryPurchase => "RECOVERY_PURCHASE",
            Self::OnboardingBonus => "ONBOARDING_BONUS",
            Self::AdminAdjust => "ADMIN_ADJUST",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WORKOUT_REWARD" => Some(Self::WorkoutReward),
            "CHALLENGE_REWARD" => Some(Self::ChallengeReward),
            "REVIEW_REWARD" => Some(Self::ReviewReward),
            "ATTENDANCE_REWARD" => Some(Self::AttendanceReward),
            "REWARD_CLAIM" => Some(Self::RewardClaim),
            "ACHIEVEMENT_BONUS" => Some(Self::AchievementBonus),
            "RECOVERY_PURCHASE" => Some(Self::RecoveryPurchase),
            "ONBOARDING_BONUS" => Some(Self::OnboardingBonus),
            "ADMIN_ADJUST" => Some(Self::AdminAdjust),
            _ => None,
        }
    }
}

/// One immutable balance change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub delta: i64,
    pub reason: MovementReason,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub balance_after: i64,
    pub created_at: i64,
}

/// Result of a successful movement
#[derive(Debug, Clone)]
pub struct Movement {
    pub previous_balance: i64,
    pub new_balance: i64,
    pub entry: LedgerEntry,
}

/// Per-user weekly attendance streak
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Streak {
    pub user_id: String,
    /// Current consecutive-week count
    pub value: i64,
    /// Value at the last uncovered break
    pub last_value: i64,
    /// Historical maximum
    pub max_value: i64,
    /// Consumable saves protecting the streak from a missed week
    pub recovery_items: i64,
    pub last_assistance_at: Option<i64>,
}

/// Which transition a streak update took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// Week attended, streak extended
    Continued,
    /// Week missed, a recovery item absorbed the break
    BreakCovered,
    /// Week missed with no recovery items, streak restarted at 1
    BreakReset,
}

/// Activity signal an achievement definition tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    StreakLength,
    AttendanceTotal,
    WorkoutsCompleted,
    RoutinesCompleted,
    ChallengesCompleted,
    PersonalRecordCount,
    BodyWeightProgress,
    TokenBalance,
    TokensEarnedTotal,
    TokensSpentTotal,
    OnboardingSteps,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreakLength => "STREAK_LENGTH",
            Self::AttendanceTotal => "ATTENDANCE_TOTAL",
            Self::WorkoutsCompleted => "WORKOUTS_COMPLETED",
            Self::RoutinesCompleted => "ROUTINES_COMPLETED",
            Self::ChallengesCompleted => "CHALLENGES_COMPLETED",
            Self::PersonalRecordCount => "PERSONAL_RECORD_COUNT",
            Self::BodyWeightProgress => "BODY_WEIGHT_PROGRESS",
            Self::TokenBalance => "TOKEN_BALANCE",
            Self::TokensEarnedTotal => "TOKENS_EARNED_TOTAL",
            Self::TokensSpentTotal => "TOKENS_SPENT_TOTAL",
            Self::OnboardingSteps => "ONBOARDING_STEPS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STREAK_LENGTH" => Some(Self::StreakLength),
            "ATTENDANCE_TOTAL" => Some(Self::AttendanceTotal),
            "WORKOUTS_COMPLETED" => Some(Self::WorkoutsCompleted),
            "ROUTINES_COMPLETED" => Some(Self::RoutinesCompleted),
            "CHALLENGES_COMPLETED" => Some(Self::ChallengesCompleted),
            "PERSONAL_RECORD_COUNT" => Some(Self::PersonalRecordCount),
            "BODY_WEIGHT_PROGRESS" => Some(Self::BodyWeightProgress),
            "TOKEN_BALANCE" => Some(Self::TokenBalance),
            "TOKENS_EARNED_TOTAL" => Some(Self::TokensEarnedTotal),
            "TOKENS_SPENT_TOTAL" => Some(Self::TokensSpentTotal),
            "ONBOARDING_STEPS" => Some(Self::OnboardingSteps),
            _ => None,
        }
    }
}

/// Achievement grouping for filtering and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Consistency,
    Training,
    Challenges,
    Strength,
    BodyProgress,
    Tokens,
    Onboarding,
}

impl AchievementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consistency => "consistency",
            Self::Training => "training",
            Self::Challenges => "challenges",
            Self::Strength => "strength",
            Self::BodyProgress => "body_progress",
            Self::Tokens => "tokens",
            Self::Onboarding => "onboarding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "consistency" => Some(Self::Consistency),
            "training" => Some(Self::Training),
            "challenges" => Some(Self::Challenges),
            "strength" => Some(Self::Strength),
            "body_progress" => Some(Self::BodyProgress),
            "tokens" => Some(Self::Tokens),
            "onboarding" => Some(Self::Onboarding),
            _ => None,
        }
    }
}

/// Catalog row: a rule specifying a metric and a target that unlocks it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub category: AchievementCategory,
    pub metric_type: MetricType,
    pub target_value: i64,
    pub is_active: bool,
}

/// One row per (user, definition)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub id: i64,
    pub user_id: String,
    pub definition_id: i64,
    pub progress_value: i64,
    pub progress_denominator: i64,
    pub unlocked: bool,
    pub unlocked_at: Option<i64>,
    pub last_source_type: Option<String>,
    pub last_source_id: Option<String>,
}

/// Append-only audit log entry for a progress row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementEventType {
    Progress,
    Unlocked,
    Reset,
}

impl AchievementEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "PROGRESS",
            Self::Unlocked => "UNLOCKED",
            Self::Reset => "RESET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROGRESS" => Some(Self::Progress),
            "UNLOCKED" => Some(Self::Unlocked),
            "RESET" => Some(Self::Reset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementEvent {
    pub id: i64,
    pub user_achievement_id: i64,
    pub event_type: AchievementEventType,
    pub delta: Option<i64>,
    pub snapshot_value: i64,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub created_at: i64,
}

/// Result of syncing one definition for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub definition_id: i64,
    pub code: String,
    pub progress_value: i64,
    pub unlocked: bool,
    pub unlocked_at: Option<i64>,
    /// True only on the call that performed the unlock
    pub just_unlocked: bool,
}

/// Read-only projection row for `get_user_achievements`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementView {
    pub definition: AchievementDefinition,
    pub progress_value: i64,
    pub progress_denominator: i64,
    pub unlocked: bool,
    pub unlocked_at: Option<i64>,
    pub last_source_type: Option<String>,
    pub last_source_id: Option<String>,
}

/// Kind of recorded activity feeding the metric resolvers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Attendance,
    Workout,
    Routine,
    Challenge,
    PersonalRecord,
    OnboardingStep,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Workout => "workout",
            Self::Routine => "routine",
            Self::Challenge => "challenge",
            Self::PersonalRecord => "personal_record",
            Self::OnboardingStep => "onboarding_step",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "workout" => Some(Self::Workout),
            "routine" => Some(Self::Routine),
            "challenge" => Some(Self::Challenge),
            "personal_record" => Some(Self::PersonalRecord),
            "onboarding_step" => Some(Self::OnboardingStep),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_round_trips_through_storage_string() {
        for reason in [
            MovementReason::WorkoutReward,
            MovementReason::RewardClaim,
            MovementReason::AdminAdjust,
        ] {
            assert_eq!(MovementReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(MovementReason::parse("NOT_A_REASON"), None);
    }

    #[test]
    fn metric_type_round_trips_through_storage_string() {
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
            assert_eq!(MetricType::parse(metric.as_str()), Some(metric));
        }
    }
}
