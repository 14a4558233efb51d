//! Resolved-alert retention
//!
//! Daily purge of alerts that were resolved long enough ago. Unresolved
//! alerts are never touched. Runs under its own guard, independent from the
//! reconciliation pass.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::{spawn_schedule, Cadence, PassGuard, ScheduleHandle, ScheduledJob};
use crate::gateway::DepositGateway;
use crate::types::WatchError;
use crate::Result;

/// Default retention period for resolved alerts
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Longest accepted retention period, roughly a century
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Purges old resolved alerts
pub struct RetentionSweeper {
    gateway: Arc<dyn DepositGateway>,
    retention_days: i64,
    guard: PassGuard,
}

impl RetentionSweeper {
    pub fn new(gateway: Arc<dyn DepositGateway>, retention_days: i64) -> Self {
        Self {
            gateway,
            retention_days,
            guard: PassGuard::new(),
        }
    }

    /// Cutoff for a sweep running at `now`
    ///
    /// Fails instead of overflowing when the period reaches past the
    /// representable calendar.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_days(self.retention_days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .ok_or_else(|| {
                WatchError::Config(format!(
                    "retention of {} days is out of range",
                    self.retention_days
                ))
            })
    }

    /// Purge alerts resolved before the cutoff
    ///
    /// Returns `Ok(None)` when another sweep is already running.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Option<u64>> {
        let Some(_token) = self.guard.try_acquire() else {
            warn!("Retention sweep already running, skipping this trigger");
            return Ok(None);
        };

        let cutoff = self.cutoff(now)?;
        let purged = self.gateway.purge_resolved_alerts(cutoff).await?;
        info!(
            purged = purged,
            cutoff = %cutoff.to_rfc3339(),
            "Old resolved alerts purged"
        );
        Ok(Some(purged))
    }

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
impl ScheduledJob for RetentionSweeper {
    fn name(&self) -> &'static str {
        "alert_retention"
    }

    async fn trigger(&self) {
        if let Err(e) = self.sweep_at(Utc::now()).await {
            error!(kind = e.kind(), "Retention sweep failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::types::{Alert, AlertPriority, AlertType};

    fn alert(id: &str, resolved_at: Option<DateTime<Utc>>) -> Alert {
        Alert {
            id: id.to_string(),
            alert_type: AlertType::HighValue,
            priority: AlertPriority::Medium,
            message: "seeded".to_string(),
            deposit_id: "d1".to_string(),
            resolved: resolved_at.is_some(),
            resolved_at,
            observations: None,
            created_at: Utc::now() - Duration::days(200),
        }
    }

    #[tokio::test]
    async fn test_purges_only_old_resolved_alerts() {
        let gateway = Arc::new(InMemoryGateway::new());
        let now = Utc::now();
        gateway.insert_alert(alert("old", Some(now - Duration::days(120)))).await;
        gateway.insert_alert(alert("recent", Some(now - Duration::days(10)))).await;
        gateway.insert_alert(alert("open", None)).await;

        let sweeper = RetentionSweeper::new(gateway.clone(), DEFAULT_RETENTION_DAYS);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), Some(1));

        let ids: Vec<String> = gateway.alerts().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["recent".to_string(), "open".to_string()]);
    }

    #[tokio::test]
    async fn test_out_of_range_retention_fails_without_purging() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.insert_alert(alert("old", Some(Utc::now() - Duration::days(120)))).await;

        for days in [i64::MAX, 10_000_000_000] {
            let sweeper = RetentionSweeper::new(gateway.clone(), days);
            let err = sweeper.sweep_at(Utc::now()).await.unwrap_err();
            assert_eq!(err.kind(), "config");
            assert!(!sweeper.guard.is_held());
        }
        assert_eq!(gateway.write_calls(), 0);
        assert_eq!(gateway.alerts().await.len(), 1);

        let sweeper = RetentionSweeper::new(gateway.clone(), MAX_RETENTION_DAYS);
        assert!(sweeper.cutoff(Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn test_skips_while_guard_held() {
        let gateway = Arc::new(InMemoryGateway::new());
        let sweeper = RetentionSweeper::new(gateway.clone(), DEFAULT_RETENTION_DAYS);

        let _token = sweeper.guard.try_acquire().unwrap();
        assert_eq!(sweeper.sweep_at(Utc::now()).await.unwrap(), None);
        assert_eq!(gateway.write_calls(), 0);
    }
}
