//! Error taxonomy for the progression engine
//!
//! Ledger and streak operations fail strictly (the caller's transaction
//! aborts); achievement sync failures are handled at the best-effort
//! boundary in `dispatch` and never reach end users.

/// Error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("business rule violated [{code}]: {message}")]
    Business {
        code: &'static str,
        message: String,
    },

    #[error("insufficient balance: have {balance}, movement of {delta} would go negative")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn business(code: &'static str, message: impl Into<String>) -> Self {
        Self::Business {
            code,
            message: message.into(),
        }
    }

    /// Machine-readable code for the business-rule variants
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Business { code, .. } => Some(code),
            Self::InsufficientBalance { .. } => Some(codes::INSUFFICIENT_BALANCE),
            _ => None,
        }
    }
}

/// Machine-readable business error codes
pub mod codes {
    pub const NO_RECOVERY_ITEMS: &str = "NO_RECOVERY_ITEMS";
    pub const DUPLICATE_MOVEMENT: &str = "DUPLICATE_MOVEMENT";
    pub const INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
}

pub type Result<T> = std::result::Result<T, EngineError>;
