//! Pass outcome reporting
//!
//! Aggregate counters for one reconciliation pass. The summary is logged at
//! the end of the pass and handed back to manual callers; nothing in-process
//! acts on it.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::issuance::DepositOutcome;
use super::resolution::SweepReport;
use crate::types::{AlertType, WatchError};

/// A deposit skipped because of an error
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepositFailure {
    pub deposit_id: String,
    pub kind: &'static str,
    pub message: String,
}

/// Counters for one completed pass
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    /// New alerts, per type
    pub created_by_type: BTreeMap<AlertType, u64>,
    pub deposits_reviewed: usize,
    /// Lifecycle states persisted because they changed
    pub state_changes: usize,
    pub resolved_obsolete: u64,
    pub resolved_extended: u64,
    pub duration_ms: u64,
    /// Deposit-level errors plus failed sweeps
    pub errors: usize,
    pub failed_deposits: Vec<DepositFailure>,
    pub failed_sweeps: usize,
}

impl RunSummary {
    pub fn new(deposits_reviewed: usize) -> Self {
        Self {
            deposits_reviewed,
            ..Default::default()
        }
    }

    /// Total alerts created
    pub fn created_total(&self) -> u64 {
        self.created_by_type.values().sum()
    }

    /// Alerts created of one type
    pub fn created(&self, alert_type: AlertType) -> u64 {
        self.created_by_type.get(&alert_type).copied().unwrap_or(0)
    }

    pub fn record_outcome(&mut self, outcome: &DepositOutcome) {
        for alert_type in &outcome.created {
            *self.created_by_type.entry(*alert_type).or_insert(0) += 1;
        }
        if outcome.state_change.is_some() {
            self.state_changes += 1;
        }
    }

    pub fn record_deposit_error(&mut self, deposit_id: &str, err: &WatchError) {
        self.failed_deposits.push(DepositFailure {
            deposit_id: deposit_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        });
        self.errors += 1;
    }

    pub fn record_sweeps(&mut self, report: &SweepReport) {
        self.resolved_obsolete = report.obsolete.as_ref().copied().unwrap_or(0);
        self.resolved_extended = report.extended.as_ref().copied().unwrap_or(0);
        self.failed_sweeps = report.failures();
        self.errors += self.failed_sweeps;
    }

    /// Error counts keyed by error kind
    pub fn error_breakdown(&self) -> BTreeMap<&'static str, usize> {
        let mut breakdown = BTreeMap::new();
        for failure in &self.failed_deposits {
            *breakdown.entry(failure.kind).or_insert(0) += 1;
        }
        if self.failed_sweeps > 0 {
            breakdown.insert("sweep", self.failed_sweeps);
        }
        breakdown
    }

    /// Emit the pass summary
    pub fn log(&self) {
        info!(
            duration_ms = self.duration_ms,
            deposits_reviewed = self.deposits_reviewed,
            alerts_created = self.created_total(),
            near_expiration = self.created(AlertType::NearExpiration),
            expired = self.created(AlertType::Expired),
            high_value = self.created(AlertType::HighValue),
            state_changes = self.state_changes,
            resolved_obsolete = self.resolved_obsolete,
            resolved_extended = self.resolved_extended,
            "Alert reconciliation pass completed"
        );

        if self.errors > 0 {
            let failed: Vec<&str> = self
                .failed_deposits
                .iter()
                .map(|f| f.deposit_id.as_str())
                .collect();
            warn!(
                errors = self.errors,
                breakdown = ?self.error_breakdown(),
                failed_deposits = ?failed,
                "Alert reconciliation pass finished with errors"
            );
        }
    }
}
