//! Reconciliation pass
//!
//! One pass lists the active deposits, issues the alerts each one warrants,
//! then runs the auto-resolution sweeps. A pass never overlaps another pass
//! on the same reconciler: a trigger that finds the guard held is skipped and
//! performs no gateway call.
//!
//! Failures confined to one deposit are logged and counted; the pass moves on.
//! Anything that escapes the pass (a failed listing, a panic) is logged as a
//! scheduler fault and the guard is released regardless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::classifier::Thresholds;
use super::guard::PassGuard;
use super::issuance::AlertIssuer;
use super::report::RunSummary;
use super::resolution::AutoResolver;
use super::scheduler::{spawn_schedule, Cadence, ScheduleHandle, ScheduledJob};
use crate::gateway::DepositGateway;
use crate::types::WatchError;
use crate::Result;

/// How a triggered pass ended
#[derive(Debug)]
pub enum PassOutcome {
    Completed(RunSummary),
    /// Another pass held the guard
    Skipped,
    /// The pass was aborted; carries a [`WatchError::SchedulerFault`]
    Failed(WatchError),
}

impl PassOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Lifetime counters of a reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Reconciliation engine
pub struct Reconciler {
    gateway: Arc<dyn DepositGateway>,
    issuer: AlertIssuer,
    resolver: AutoResolver,
    guard: PassGuard,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn DepositGateway>, thresholds: Thresholds) -> Self {
        Self {
            issuer: AlertIssuer::new(gateway.clone(), thresholds),
            resolver: AutoResolver::new(gateway.clone(), thresholds),
            gateway,
            guard: PassGuard::new(),
            completed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(gateway: Arc<dyn DepositGateway>) -> Self {
        Self::new(gateway, Thresholds::default())
    }

    /// Whether a pass currently holds the guard
    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    pub fn stats(&self) -> PassStats {
        PassStats {
            completed: self.completed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Run one pass now, outside any schedule
    pub async fn run_once(&self) -> PassOutcome {
        self.run_once_at(Utc::now()).await
    }

    /// Run one pass evaluating every deposit against `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> PassOutcome {
        let Some(_token) = self.guard.try_acquire() else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            warn!("Alert reconciliation already running, skipping this trigger");
            return PassOutcome::Skipped;
        };

        info!("Starting alert reconciliation pass");

        match AssertUnwindSafe(self.pass(now)).catch_unwind().await {
            Ok(Ok(summary)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                summary.log();
                PassOutcome::Completed(summary)
            }
            Ok(Err(e)) => self.abort(format!("pass aborted: {}", e)),
            Err(panic) => self.abort(format!("pass panicked: {}", panic_message(&*panic))),
        }
    }

    fn abort(&self, reason: String) -> PassOutcome {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let fault = WatchError::SchedulerFault(reason);
        error!(kind = fault.kind(), "Alert reconciliation failed: {}", fault);
        PassOutcome::Failed(fault)
    }

    async fn pass(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let started = Instant::now();

        let listing = self.gateway.list_active_deposits().await?;
        info!(count = listing.len(), "Evaluating active deposits");

        let mut summary = RunSummary::new(listing.len());
        for e in &listing.unreadable {
            let deposit_id = e.deposit_id().unwrap_or("<unknown>");
            warn!(deposit_id, kind = e.kind(), "Skipping deposit: {}", e);
            summary.record_deposit_error(deposit_id, e);
        }
        for deposit in &listing.deposits {
            match self.issuer.issue(deposit, now).await {
                Ok(outcome) => summary.record_outcome(&outcome),
                Err(e) => {
                    warn!(
                        deposit_id = %deposit.id,
                        deposit_number = %deposit.number,
                        kind = e.kind(),
                        "Skipping deposit: {}",
                        e
                    );
                    summary.record_deposit_error(&deposit.id, &e);
                }
            }
        }

        let sweeps = self.resolver.run(now).await;
        summary.record_sweeps(&sweeps);

        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Fire this reconciler on a cron expression evaluated in `timezone`
    pub fn register_schedule(
        self: &Arc<Self>,
        expression: &str,
        timezone: &str,
    ) -> Result<ScheduleHandle> {
        let cadence = Cadence::cron(expression, timezone)?;
        Ok(spawn_schedule(self.clone(), cadence))
    }
}

#[async_trait]
impl ScheduledJob for Reconciler {
    fn name(&self) -> &'static str {
        "alert_reconciliation"
    }

    async fn trigger(&self) {
        self.run_once().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ActiveDeposits, InMemoryGateway};
    use crate::types::{AlertType, Deposit, LifecycleState};
    use chrono::Duration;

    /// Gateway whose listing panics
    struct PanickingGateway;

    #[async_trait]
    impl DepositGateway for PanickingGateway {
        async fn list_active_deposits(&self) -> Result<ActiveDeposits> {
            panic!("listing exploded");
        }
        async fn list_obsolete_deposit_ids(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn find_unresolved_alert(
            &self,
            _deposit_id: &str,
            _alert_type: AlertType,
        ) -> Result<Option<crate::types::Alert>> {
            Ok(None)
        }
        async fn create_alert(&self, _alert: crate::types::NewAlert) -> Result<crate::types::Alert> {
            Err(WatchError::Persistence("unused".into()))
        }
        async fn bulk_resolve_alerts(
            &self,
            _filter: crate::types::AlertFilter,
            _patch: crate::types::ResolutionPatch,
        ) -> Result<u64> {
            Ok(0)
        }
        async fn save_deposit_state(&self, _deposit_id: &str, _state: LifecycleState) -> Result<()> {
            Ok(())
        }
        async fn purge_resolved_alerts(&self, _resolved_before: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
    }

    fn setup() -> (Arc<InMemoryGateway>, Arc<Reconciler>) {
        let gateway = Arc::new(InMemoryGateway::new());
        let reconciler = Arc::new(Reconciler::with_defaults(gateway.clone()));
        (gateway, reconciler)
    }

    #[tokio::test]
    async fn test_pass_summary() {
        let (gateway, reconciler) = setup();
        let now = Utc::now();
        gateway
            .insert_deposit(Deposit::new("d1", "DEP-1", 1.0, 1.0).with_expiration(now - Duration::days(2)))
            .await;
        gateway
            .insert_deposit(Deposit::new("d2", "DEP-2", 150.0, 100.0))
            .await;

        let outcome = reconciler.run_once_at(now).await;
        let summary = outcome.summary().expect("pass should complete");
        assert_eq!(summary.deposits_reviewed, 2);
        assert_eq!(summary.created(AlertType::Expired), 1);
        assert_eq!(summary.created(AlertType::HighValue), 1);
        assert_eq!(summary.state_changes, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(reconciler.stats().completed, 1);
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn test_deposit_failure_does_not_abort_pass() {
        let (gateway, reconciler) = setup();
        let now = Utc::now();
        for id in ["d1", "d2", "d3"] {
            gateway
                .insert_deposit(
                    Deposit::new(id, format!("DEP-{id}"), 1.0, 1.0)
                        .with_expiration(now - Duration::days(1)),
                )
                .await;
        }
        gateway.fail_create_alert_for("d2").await;

        let outcome = reconciler.run_once_at(now).await;
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.created(AlertType::Expired), 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failed_deposits[0].deposit_id, "d2");
        assert_eq!(gateway.unresolved_alerts_for("d1").await.len(), 1);
        assert_eq!(gateway.unresolved_alerts_for("d3").await.len(), 1);
        assert!(gateway.unresolved_alerts_for("d2").await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_deposit_is_counted_as_classification_error() {
        let (gateway, reconciler) = setup();
        let now = Utc::now();
        gateway
            .insert_deposit(Deposit::new("d1", "DEP-1", 1.0, 1.0).with_expiration(now - Duration::days(1)))
            .await;
        gateway
            .insert_unreadable_deposit("d2", "missing field `deposit_date`")
            .await;

        let outcome = reconciler.run_once_at(now).await;
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.deposits_reviewed, 2);
        assert_eq!(summary.created(AlertType::Expired), 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failed_deposits[0].deposit_id, "d2");
        assert_eq!(summary.failed_deposits[0].kind, "classification");
        assert!(summary.failed_deposits[0].message.contains("deposit_date"));
        assert_eq!(summary.error_breakdown().get("classification"), Some(&1));
    }

    #[tokio::test]
    async fn test_listing_failure_releases_guard() {
        let (gateway, reconciler) = setup();
        gateway.fail_active_listing(true).await;

        let outcome = reconciler.run_once().await;
        assert!(matches!(
            outcome,
            PassOutcome::Failed(WatchError::SchedulerFault(_))
        ));
        assert!(!reconciler.is_running());

        gateway.clear_faults().await;
        assert!(reconciler.run_once().await.summary().is_some());
        assert_eq!(
            reconciler.stats(),
            PassStats {
                completed: 1,
                skipped: 0,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let reconciler = Reconciler::with_defaults(Arc::new(PanickingGateway));

        match reconciler.run_once().await {
            PassOutcome::Failed(WatchError::SchedulerFault(reason)) => {
                assert!(reason.contains("listing exploded"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let (gateway, reconciler) = setup();
        gateway
            .insert_deposit(
                Deposit::new("d1", "DEP-1", 1.0, 1.0).with_expiration(Utc::now() - Duration::days(1)),
            )
            .await;
        gateway.stall_listing();

        let first = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.run_once().await }
        });
        gateway.listing_entered().await;
        assert!(reconciler.is_running());

        let writes_before = gateway.write_calls();
        let second = reconciler.run_once().await;
        assert!(second.is_skipped());
        assert_eq!(gateway.write_calls(), writes_before);

        gateway.release_listing();
        let first = first.await.unwrap();
        assert_eq!(first.summary().unwrap().created(AlertType::Expired), 1);
        assert_eq!(gateway.alerts().await.len(), 1);
        assert_eq!(reconciler.stats().skipped, 1);
    }
}
