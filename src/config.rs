//! Configuration for Deposit Watch
//!
//! CLI arguments and environment variable handling using clap.

use clap::{ArgAction, Parser, ValueEnum};

use crate::engine::{Cadence, Thresholds};
use crate::retention::MAX_RETENTION_DAYS;
use crate::types::WatchError;
use crate::Result;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Deposit Watch - deposit reconciliation and alert issuance
#[derive(Parser, Debug, Clone)]
#[command(name = "deposit-watch")]
#[command(about = "Periodic deposit reconciliation and alert issuance")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "deposit_watch")]
    pub mongodb_db: String,

    /// Cron expression for the reconciliation pass (5 or 6 fields)
    #[arg(long, env = "ALERT_SCHEDULE", default_value = "0 * * * *")]
    pub alert_schedule: String,

    /// IANA timezone the schedules are evaluated in
    #[arg(long, env = "SCHEDULE_TIMEZONE", default_value = "Europe/Madrid")]
    pub schedule_timezone: String,

    /// Days before expiration inside which a near-expiration alert is raised
    #[arg(long, env = "NEAR_EXPIRATION_DAYS", default_value = "30")]
    pub near_expiration_days: i64,

    /// Total value above which a deposit is flagged as high value
    #[arg(long, env = "HIGH_VALUE_THRESHOLD", default_value = "10000")]
    pub high_value_threshold: f64,

    /// Run one pass right after startup
    #[arg(long, env = "RUN_ON_STARTUP", default_value = "false")]
    pub run_on_startup: bool,

    /// Enable the resolved-alert retention sweep
    #[arg(long, env = "RETENTION_ENABLED", default_value = "true", action = ArgAction::Set)]
    pub retention_enabled: bool,

    /// Cron expression for the retention sweep
    #[arg(long, env = "RETENTION_SCHEDULE", default_value = "0 3 * * *")]
    pub retention_schedule: String,

    /// Resolved alerts older than this many days are purged
    #[arg(long, env = "RETENTION_DAYS", default_value = "90")]
    pub retention_days: i64,

    /// Enable development mode (in-memory store when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    /// Classification thresholds from the configured values
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            near_expiration_days: self.near_expiration_days,
            high_value: self.high_value_threshold,
        }
    }

    pub fn alert_cadence(&self) -> Result<Cadence> {
        Cadence::cron(&self.alert_schedule, &self.schedule_timezone)
    }

    pub fn retention_cadence(&self) -> Result<Cadence> {
        Cadence::cron(&self.retention_schedule, &self.schedule_timezone)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.alert_cadence()?;

        if self.near_expiration_days <= 0 {
            return Err(WatchError::Config(
                "NEAR_EXPIRATION_DAYS must be positive".to_string(),
            ));
        }

        if !self.high_value_threshold.is_finite() || self.high_value_threshold <= 0.0 {
            return Err(WatchError::Config(
                "HIGH_VALUE_THRESHOLD must be a positive number".to_string(),
            ));
        }

        if self.retention_enabled {
            self.retention_cadence()?;
            if self.retention_days <= 0 {
                return Err(WatchError::Config(
                    "RETENTION_DAYS must be positive".to_string(),
                ));
            }
            if self.retention_days > MAX_RETENTION_DAYS {
                return Err(WatchError::Config(format!(
                    "RETENTION_DAYS must be at most {}",
                    MAX_RETENTION_DAYS
                )));
            }
        }

        Ok(())
    }
}
