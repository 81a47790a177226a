use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use momentum::models::{AchievementCategory, ActivityKind, MovementReason};
use momentum::{
    sync_best_effort, EngineConfig, MovementRequest, ProgressionEngine, TracingNotifier,
};

#[derive(Parser)]
#[command(name = "momentum")]
#[command(about = "Progression engine for a gamified fitness app")]
#[command(version)]
struct Cli {
    /// Path to the database (defaults to the configured location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file at ~/.momentum/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show a member's token balance
    Balance { user: String },

    /// Show a member's movement history, most recent first
    History {
        user: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Register a token movement (positive = award, negative = spend)
    Move {
        user: String,
        delta: i64,
        /// Movement reason, e.g. WORKOUT_REWARD or REWARD_CLAIM
        reason: String,
        #[arg(long)]
        ref_type: Option<String>,
        #[arg(long)]
        ref_id: Option<String>,
    },

    /// Create a member's streak row (onboarding)
    Onboard { user: String },

    /// Apply a weekly attendance result to the streak, then sync
    Attend {
        user: String,
        /// The week was missed (break instead of continuation)
        #[arg(long)]
        missed: bool,
    },

    /// Record a completed workout, award tokens, then sync
    Workout {
        user: String,
        #[arg(long, default_value_t = 25)]
        reward: i64,
        /// Business reference for idempotent awarding
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Show a member's streak state
    Streak { user: String },

    /// Spend one streak recovery item
    UseRecovery { user: String },

    /// Grant streak recovery items
    GrantRecovery {
        user: String,
        #[arg(long, default_value_t = 1)]
        count: i64,
    },

    /// Administratively reset a streak to zero
    ResetStreak { user: String },

    /// Record a generic activity signal (attendance, workout, routine,
    /// challenge, personal_record, onboarding_step)
    Record { user: String, kind: String },

    /// Record a body-weight sample in kilograms
    Weight { user: String, kg: f64 },

    /// Run a full achievement sync for a member
    Sync {
        user: String,
        #[arg(long)]
        category: Option<String>,
    },

    /// Show a member's achievements
    Achievements {
        user: String,
        #[arg(long)]
        category: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the active achievement catalog
    Definitions,

    /// Show the audit trail for one (member, definition) pair
    Events { user: String, definition_id: i64 },

    /// Delete progression state or recorded activity (destructive)
    Reset {
        /// Wipe ledger, streaks, and achievement progress
        #[arg(long)]
        progression: bool,
        /// Wipe recorded activity and body metrics
        #[arg(long)]
        activity: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if let Commands::Init { force } = &cli.command {
        let path = EngineConfig::default_config_path();
        if path.exists() && !force {
            bail!("config already exists at {} (use --force)", path.display());
        }
        EngineConfig::default().save(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let engine = match &cli.db {
        Some(path) => ProgressionEngine::open(path)?,
        None => ProgressionEngine::open_default()?,
    };

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Balance { user } => {
            println!("{}", engine.ledger().get_balance(&user)?);
        }

        Commands::History { user, limit, offset } => {
            for entry in engine.ledger().get_history(&user, limit, offset)? {
                println!(
                    "{:>6}  {:>+6}  {:<18}  balance {:>6}  {}",
                    entry.id,
                    entry.delta,
                    entry.reason.as_str(),
                    entry.balance_after,
                    entry
                        .ref_type
                        .as_deref()
                        .map(|t| format!("{t}/{}", entry.ref_id.as_deref().unwrap_or("?")))
                        .unwrap_or_default(),
                );
            }
        }

        Commands::Move { user, delta, reason, ref_type, ref_id } => {
            let Some(reason) = MovementReason::parse(&reason) else {
                bail!("unknown movement reason: {reason}");
            };
            let mut req = MovementRequest::new(user, delta, reason);
            if let (Some(t), Some(i)) = (ref_type, ref_id) {
                req = req.with_ref(t, i);
            }
            let movement = engine.ledger().register_movement(&req)?;
            println!(
                "{} -> {}",
                movement.previous_balance, movement.new_balance
            );
        }

        Commands::Onboard { user } => {
            let streak = engine.streaks().create_streak(&user)?;
            println!("streak ready: value {}", streak.value);
        }

        Commands::Attend { user, missed } => {
            if !missed {
                engine.activity().record_attendance(&user)?;
            }
            let (streak, transition) = engine.streaks().update_streak(&user, !missed)?;
            println!(
                "{transition:?}: value {}, recovery items {}",
                streak.value, streak.recovery_items
            );
            sync_best_effort(engine.achievements(), &TracingNotifier, &user, None);
        }

        Commands::Workout { user, reward, session_id } => {
            engine.activity().record_workout(&user)?;
            if reward > 0 {
                let mut req = MovementRequest::new(&user, reward, MovementReason::WorkoutReward);
                if let Some(id) = session_id {
                    req = req.with_ref("workout_session", id);
                }
                let movement = engine.ledger().register_movement(&req)?;
                println!("awarded {reward}, balance {}", movement.new_balance);
            }
            sync_best_effort(engine.achievements(), &TracingNotifier, &user, None);
        }

        Commands::Streak { user } => {
            let streak = engine.streaks().get_user_streak(&user)?;
            println!(
                "value {}  max {}  last {}  recovery items {}",
                streak.value, streak.max_value, streak.last_value, streak.recovery_items
            );
        }

        Commands::UseRecovery { user } => {
            let streak = engine.streaks().use_recovery_item(&user)?;
            println!("recovery items left: {}", streak.recovery_items);
        }

        Commands::GrantRecovery { user, count } => {
            let streak = engine.streaks().grant_recovery_items(&user, count)?;
            println!("recovery items: {}", streak.recovery_items);
        }

        Commands::ResetStreak { user } => {
            let streak = engine.streaks().reset_streak(&user)?;
            println!("value {} (was {})", streak.value, streak.last_value);
        }

        Commands::Record { user, kind } => {
            let Some(kind) = ActivityKind::parse(&kind) else {
                bail!("unknown activity kind: {kind}");
            };
            engine.activity().record(&user, kind)?;
        }

        Commands::Weight { user, kg } => {
            engine.activity().record_body_weight(&user, kg)?;
        }

        Commands::Sync { user, category } => {
            let category = parse_category(category.as_deref())?;
            let outcomes =
                sync_best_effort(engine.achievements(), &TracingNotifier, &user, category);
            for outcome in outcomes.iter().filter(|o| o.just_unlocked) {
                println!("unlocked: {}", outcome.code);
            }
            println!("synced {} definitions", outcomes.len());
        }

        Commands::Achievements { user, category, json } => {
            let category = parse_category(category.as_deref())?;
            let views = engine.achievements().get_user_achievements(&user, category)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                for view in views {
                    println!(
                        "{} {:<22} {:>4}/{:<4}  {}",
                        if view.unlocked { "*" } else { " " },
                        view.definition.code,
                        view.progress_value,
                        view.progress_denominator,
                        view.definition.name,
                    );
                }
            }
        }

        Commands::Definitions => {
            for def in engine.achievements().get_definitions(None)? {
                println!(
                    "{:>4}  {:<22} {:<14} {:<22} target {}",
                    def.id,
                    def.code,
                    def.category.as_str(),
                    def.metric_type.as_str(),
                    def.target_value,
                );
            }
        }

        Commands::Reset { progression, activity } => {
            if !progression && !activity {
                bail!("nothing to reset: pass --progression and/or --activity");
            }
            if progression {
                engine.db().reset_progression()?;
                println!("progression state cleared");
            }
            if activity {
                engine.db().reset_activity()?;
                println!("recorded activity cleared");
            }
        }

        Commands::Events { user, definition_id } => {
            for event in engine.achievements().get_events(&user, definition_id)? {
                println!(
                    "{:>6}  {:<9}  delta {:>5}  snapshot {:>5}",
                    event.id,
                    event.event_type.as_str(),
                    event.delta.map(|d| d.to_string()).unwrap_or_default(),
                    event.snapshot_value,
                );
            }
        }
    }

    Ok(())
}

fn parse_category(s: Option<&str>) -> Result<Option<AchievementCategory>> {
    match s {
        None => Ok(None),
        Some(s) => match AchievementCategory::parse(s) {
            Some(cat) => Ok(Some(cat)),
            None => bail!("unknown category: {s}"),
        },
    }
}
