//! Reconciliation engine
//!
//! - `classifier`: pure risk facts and lifecycle state for a deposit
//! - `issuance`: creates the alerts a deposit warrants, at most one per type
//! - `resolution`: bulk auto-resolution sweeps
//! - `reconciler`: one guarded pass over every active deposit
//! - `scheduler`: cron-driven background firing

pub mod classifier;
pub mod guard;
pub mod issuance;
pub mod reconciler;
pub mod report;
pub mod resolution;
pub mod scheduler;

pub use classifier::{
    classify, days_to_expiration, derive_state, ExpirationFact, RiskFacts, Thresholds,
    HIGH_VALUE_THRESHOLD, NEAR_EXPIRATION_WINDOW_DAYS,
};
pub use guard::PassGuard;
pub use issuance::{priority_for, AlertIssuer, DepositOutcome, ISSUED_OBSERVATION};
pub use reconciler::{PassOutcome, PassStats, Reconciler};
pub use report::RunSummary;
pub use resolution::{AutoResolver, SweepReport, EXTENDED_OBSERVATION, OBSOLETE_OBSERVATION};
pub use scheduler::{spawn_schedule, Cadence, ScheduleHandle, ScheduledJob};
