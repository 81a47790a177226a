//! Engine assembly
//!
//! `ProgressionEngine` constructs every service once from a shared
//! database handle and passes the set by reference through the call
//! graph. There is no global container; tests build engines against
//! throwaway databases the same way production code does.

use std::path::Path;

use anyhow::Result;

use crate::achievements::AchievementSyncEngine;
use crate::activity::ActivityRecorder;
use crate::config::EngineConfig;
use crate::db::Db;
use crate::ledger::TokenLedger;
use crate::streak::StreakTracker;

/// All engine services over one database
#[derive(Clone)]
pub struct ProgressionEngine {
    db: Db,
    ledger: TokenLedger,
    streaks: StreakTracker,
    achievements: AchievementSyncEngine,
    activity: ActivityRecorder,
}

impl ProgressionEngine {
    /// Open (or create) the engine at a specific database path
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_db(Db::open(path)?)
    }

    /// Open the engine at the configured default location
    pub fn open_default() -> Result<Self> {
        let config = EngineConfig::load_default()?;
        Self::open(&config.db_path)
    }

    /// Assemble services around an existing database handle
    pub fn with_db(db: Db) -> Result<Self> {
        let achievements = AchievementSyncEngine::new(db.clone());
        achievements.seed_defaults()?;
        Ok(Self {
            ledger: TokenLedger::new(db.clone()),
            streaks: StreakTracker::new(db.clone()),
            activity: ActivityRecorder::new(db.clone()),
            achievements,
            db,
        })
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn streaks(&self) -> &StreakTracker {
        &self.streaks
    }

    pub fn achievements(&self) -> &AchievementSyncEngine {
        &self.achievements
    }

    pub fn activity(&self) -> &ActivityRecorder {
        &self.activity
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
