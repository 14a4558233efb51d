//! Deposit Watch - deposit reconciliation and alert issuance
//!
//! Periodically reviews every active deposit, raises an alert for each risk
//! condition it finds (expired, near expiration, high value) and resolves
//! alerts whose condition no longer holds.
//!
//! ## Components
//!
//! - **Engine**: classifier, alert issuance, auto-resolution and the guarded
//!   reconciliation pass
//! - **Scheduler**: cron-driven background firing in a configured timezone
//! - **Gateway**: persistence seam with MongoDB and in-memory stores
//! - **Retention**: daily purge of long-resolved alerts

pub mod config;
pub mod db;
pub mod engine;
pub mod gateway;
pub mod retention;
pub mod types;

pub use config::Args;
pub use engine::{PassOutcome, Reconciler, RunSummary, ScheduleHandle, Thresholds};
pub use gateway::{ActiveDeposits, DepositGateway, InMemoryGateway, MongoGateway};
pub use retention::RetentionSweeper;
pub use types::{Result, WatchError};
