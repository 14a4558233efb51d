//! Alert auto-resolution
//!
//! Two bulk sweeps close alerts whose condition stopped holding:
//!
//! - **Obsolescence**: every unresolved alert of a deposit that is inactive,
//!   withdrawn or invoiced.
//! - **Extension**: expiration alerts of active deposits whose deadline moved
//!   beyond the near-expiration window.
//!
//! Both only ever touch unresolved alerts, so repeating them on unchanged data
//! changes nothing. They are independent: one failing does not stop the other.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use super::classifier::{days_to_expiration, Thresholds};
use crate::gateway::DepositGateway;
use crate::types::{AlertFilter, AlertType, ResolutionPatch, WatchError};
use crate::Result;

pub const OBSOLETE_OBSERVATION: &str = "Resolved automatically - deposit no longer active";

pub const EXTENDED_OBSERVATION: &str = "Resolved automatically - expiration deadline extended";

/// Result of both sweeps; a sweep that failed carries its error
#[derive(Debug)]
pub struct SweepReport {
    pub obsolete: Result<u64>,
    pub extended: Result<u64>,
}

impl SweepReport {
    /// Alerts resolved across both sweeps
    pub fn resolved(&self) -> u64 {
        self.obsolete.as_ref().copied().unwrap_or(0) + self.extended.as_ref().copied().unwrap_or(0)
    }

    /// Number of sweeps that failed
    pub fn failures(&self) -> usize {
        [self.obsolete.is_err(), self.extended.is_err()]
            .iter()
            .filter(|failed| **failed)
            .count()
    }
}

/// Runs the auto-resolution sweeps
pub struct AutoResolver {
    gateway: Arc<dyn DepositGateway>,
    thresholds: Thresholds,
}

impl AutoResolver {
    pub fn new(gateway: Arc<dyn DepositGateway>, thresholds: Thresholds) -> Self {
        Self {
            gateway,
            thresholds,
        }
    }

    /// Resolve every unresolved alert of inactive or terminal deposits
    pub async fn sweep_obsolete(&self, now: DateTime<Utc>) -> Result<u64> {
        let deposit_ids = self.gateway.list_obsolete_deposit_ids().await?;
        if deposit_ids.is_empty() {
            return Ok(0);
        }

        let resolved = self
            .gateway
            .bulk_resolve_alerts(
                AlertFilter::for_deposits(deposit_ids),
                ResolutionPatch::new(now, OBSOLETE_OBSERVATION),
            )
            .await?;

        if resolved > 0 {
            info!(count = resolved, "Obsolete alerts resolved automatically");
        }
        Ok(resolved)
    }

    /// Resolve expiration alerts of deposits whose deadline left the window
    pub async fn sweep_extended(&self, now: DateTime<Utc>) -> Result<u64> {
        let window = self.thresholds.near_expiration_days;
        let deposit_ids: Vec<String> = self
            .gateway
            .list_active_deposits()
            .await?
            .deposits
            .into_iter()
            .filter(|d| {
                d.expiration_date
                    .is_some_and(|exp| days_to_expiration(exp, now) > window)
            })
            .map(|d| d.id)
            .collect();

        if deposit_ids.is_empty() {
            return Ok(0);
        }

        let resolved = self
            .gateway
            .bulk_resolve_alerts(
                AlertFilter::for_deposits(deposit_ids).with_types(&AlertType::EXPIRATION),
                ResolutionPatch::new(now, EXTENDED_OBSERVATION),
            )
            .await?;

        if resolved > 0 {
            info!(count = resolved, "Expiration alerts resolved after deadline extension");
        }
        Ok(resolved)
    }

    /// Run both sweeps, logging failures individually
    pub async fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let obsolete = self.sweep_obsolete(now).await;
        if let Err(e) = &obsolete {
            log_sweep_failure("obsolescence", e);
        }

        let extended = self.sweep_extended(now).await;
        if let Err(e) = &extended {
            log_sweep_failure("extension", e);
        }

        SweepReport { obsolete, extended }
    }
}

fn log_sweep_failure(sweep: &str, err: &WatchError) {
    error!(sweep = sweep, kind = err.kind(), "Auto-resolution sweep failed: {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::types::{Alert, AlertPriority, Deposit, LifecycleState};
    use chrono::Duration;

    fn unresolved(id: &str, deposit_id: &str, alert_type: AlertType) -> Alert {
        Alert {
            id: id.to_string(),
            alert_type,
            priority: AlertPriority::Medium,
            message: "seeded".to_string(),
            deposit_id: deposit_id.to_string(),
            resolved: false,
            resolved_at: None,
            observations: None,
            created_at: Utc::now() - Duration::days(3),
        }
    }

    fn setup() -> (Arc<InMemoryGateway>, AutoResolver) {
        let gateway = Arc::new(InMemoryGateway::new());
        let resolver = AutoResolver::new(gateway.clone(), Thresholds::default());
        (gateway, resolver)
    }

    #[tokio::test]
    async fn test_obsolete_sweep_resolves_all_types() {
        let (gateway, resolver) = setup();
        gateway
            .insert_deposit(Deposit::new("d3", "DEP-3", 1.0, 1.0).with_active(false))
            .await;
        gateway
            .insert_alert(unresolved("a1", "d3", AlertType::NearExpiration))
            .await;
        gateway
            .insert_alert(unresolved("a2", "d3", AlertType::HighValue))
            .await;

        let now = Utc::now();
        assert_eq!(resolver.sweep_obsolete(now).await.unwrap(), 2);

        for alert in gateway.alerts().await {
            assert!(alert.resolved);
            assert_eq!(alert.resolved_at, Some(now));
            assert_eq!(alert.observations.as_deref(), Some(OBSOLETE_OBSERVATION));
        }

        // Second run changes nothing
        assert_eq!(resolver.sweep_obsolete(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_obsolete_sweep_covers_terminal_states() {
        let (gateway, resolver) = setup();
        gateway
            .insert_deposit(
                Deposit::new("d1", "DEP-1", 1.0, 1.0).with_state(LifecycleState::Withdrawn),
            )
            .await;
        gateway
            .insert_deposit(Deposit::new("d2", "DEP-2", 1.0, 1.0))
            .await;
        gateway
            .insert_alert(unresolved("a1", "d1", AlertType::Expired))
            .await;
        gateway
            .insert_alert(unresolved("a2", "d2", AlertType::Expired))
            .await;

        assert_eq!(resolver.sweep_obsolete(Utc::now()).await.unwrap(), 1);
        assert!(gateway.unresolved_alerts_for("d1").await.is_empty());
        assert_eq!(gateway.unresolved_alerts_for("d2").await.len(), 1);
    }

    #[tokio::test]
    async fn test_extension_sweep_spares_high_value() {
        let (gateway, resolver) = setup();
        let now = Utc::now();
        gateway
            .insert_deposit(
                Deposit::new("d1", "DEP-1", 200.0, 100.0).with_expiration(now + Duration::days(45)),
            )
            .await;
        gateway
            .insert_alert(unresolved("a1", "d1", AlertType::Expired))
            .await;
        gateway
            .insert_alert(unresolved("a2", "d1", AlertType::NearExpiration))
            .await;
        gateway
            .insert_alert(unresolved("a3", "d1", AlertType::HighValue))
            .await;

        assert_eq!(resolver.sweep_extended(now).await.unwrap(), 2);

        let remaining = gateway.unresolved_alerts_for("d1").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].alert_type, AlertType::HighValue);
    }

    #[tokio::test]
    async fn test_extension_sweep_leaves_window_alone() {
        let (gateway, resolver) = setup();
        let now = Utc::now();
        gateway
            .insert_deposit(
                Deposit::new("d1", "DEP-1", 1.0, 1.0)
                    .with_expiration(now + Duration::days(30) + Duration::hours(1)),
            )
            .await;
        gateway
            .insert_alert(unresolved("a1", "d1", AlertType::NearExpiration))
            .await;

        assert_eq!(resolver.sweep_extended(now).await.unwrap(), 0);
        assert_eq!(gateway.unresolved_alerts_for("d1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_sweep_does_not_block_the_other() {
        let (gateway, resolver) = setup();
        let now = Utc::now();
        gateway
            .insert_deposit(
                Deposit::new("d1", "DEP-1", 1.0, 1.0).with_expiration(now + Duration::days(60)),
            )
            .await;
        gateway
            .insert_alert(unresolved("a1", "d1", AlertType::Expired))
            .await;
        gateway.fail_obsolete_listing(true).await;

        let report = resolver.run(now).await;
        assert!(report.obsolete.is_err());
        assert_eq!(report.extended.as_ref().copied().unwrap(), 1);
        assert_eq!(report.resolved(), 1);
        assert_eq!(report.failures(), 1);
    }
}
