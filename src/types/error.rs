//! Error types for Deposit Watch

/// Main error type for reconciliation operations
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A gateway call failed (read or write against the deposit/alert store)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Deposit data could not be classified
    #[error("Classification error for deposit {deposit_id}: {reason}")]
    Classification { deposit_id: String, reason: String },

    /// Unexpected failure escaping a whole pass
    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WatchError {
    /// Build a classification error for a deposit
    pub fn classification(deposit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Classification {
            deposit_id: deposit_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is confined to a single deposit and the pass may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Classification { .. })
    }

    /// Deposit the error is about, when it is confined to one
    pub fn deposit_id(&self) -> Option<&str> {
        match self {
            Self::Classification { deposit_id, .. } => Some(deposit_id),
            _ => None,
        }
    }

    /// Short label used in error breakdowns
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "persistence",
            Self::Classification { .. } => "classification",
            Self::SchedulerFault(_) => "scheduler_fault",
            Self::Config(_) => "config",
        }
    }
}

impl From<mongodb::error::Error> for WatchError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<bson::ser::Error> for WatchError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Persistence(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::oid::Error> for WatchError {
    fn from(err: bson::oid::Error) -> Self {
        Self::Persistence(format!("Invalid object id: {}", err))
    }
}

/// Result type alias for Deposit Watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
