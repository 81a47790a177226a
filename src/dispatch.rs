//! The strict/best-effort boundary
//!
//! Token and streak writes are strict: their failures abort the caller's
//! transaction. Achievement sync is an advisory projection that is
//! allowed to lag, so the one place a triggering flow invokes it is
//! through `sync_best_effort`, which catches, logs, and discards any
//! failure. The asymmetry lives here and nowhere else.

use crate::achievements::AchievementSyncEngine;
use crate::models::{AchievementCategory, SyncOutcome};

/// Hand-off payload for a fresh unlock
#[derive(Debug, Clone)]
pub struct UnlockNotice {
    pub user_id: String,
    pub definition_id: i64,
    pub code: String,
    pub unlocked_at: Option<i64>,
}

/// Receives newly unlocked achievements, fire-and-forget.
///
/// Implementations must not fail loudly; delivery is not part of the
/// engine's consistency guarantees.
pub trait UnlockNotifier {
    fn notify(&self, notices: &[UnlockNotice]);
}

/// Default notifier: logs each unlock
pub struct TracingNotifier;

impl UnlockNotifier for TracingNotifier {
    fn notify(&self, notices: &[UnlockNotice]) {
        for notice in notices {
            tracing::info!(
                user = %notice.user_id,
                code = %notice.code,
                "achievement unlocked, notifying"
            );
        }
    }
}

/// Run a full achievement sync for a user after a triggering action.
///
/// Never fails and never propagates: a sync error is logged and an empty
/// result returned, so progress simply lags until the next trigger.
pub fn sync_best_effort(
    achievements: &AchievementSyncEngine,
    notifier: &dyn UnlockNotifier,
    user_id: &str,
    category: Option<AchievementCategory>,
) -> Vec<SyncOutcome> {
    match achievements.sync_all_achievements_for_user(user_id, category) {
        Ok(outcomes) => {
            let notices: Vec<UnlockNotice> = outcomes
                .iter()
                .filter(|o| o.just_unlocked)
                .map(|o| UnlockNotice {
                    user_id: user_id.to_string(),
                    definition_id: o.definition_id,
                    code: o.code.clone(),
                    unlocked_at: o.unlocked_at,
                })
                .collect();
            if !notices.is_empty() {
                notifier.notify(&notices);
            }
            outcomes
        }
        Err(e) => {
            tracing::warn!(user = %user_id, error = %e, "best-effort achievement sync failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRecorder;
    use crate::db::Db;
    use std::sync::Mutex;

    struct CapturingNotifier {
        seen: Mutex<Vec<UnlockNotice>>,
    }

    impl UnlockNotifier for CapturingNotifier {
        fn notify(&self, notices: &[UnlockNotice]) {
            self.seen.lock().unwrap().extend_from_slice(notices);
        }
    }

    #[test]
    fn forwards_only_fresh_unlocks() {
        let db = Db::open_in_memory().unwrap();
        let sync = AchievementSyncEngine::new(db.clone());
        sync.seed_defaults().unwrap();
        let activity = ActivityRecorder::new(db);
        activity.record_workout("u1").unwrap();

        let notifier = CapturingNotifier {
            seen: Mutex::new(Vec::new()),
        };

        sync_best_effort(&sync, &notifier, "u1", None);
        let first_round = notifier.seen.lock().unwrap().len();
        assert!(first_round >= 1);
        assert!(notifier
            .seen
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.code == "first_workout"));

        // Second sync with no new activity: nothing re-notified
        sync_best_effort(&sync, &notifier, "u1", None);
        assert_eq!(notifier.seen.lock().unwrap().len(), first_round);
    }

    #[test]
    fn swallows_sync_failure() {
        let db = Db::open_in_memory().unwrap();
        let sync = AchievementSyncEngine::new(db.clone());
        sync.seed_defaults().unwrap();
        // Sabotage the read path so the batch load fails
        db.conn()
            .execute_batch("DROP TABLE achievement_definitions")
            .unwrap();

        let outcomes = sync_best_effort(&sync, &TracingNotifier, "u1", None);
        assert!(outcomes.is_empty());
    }
}
