//! Alert issuance
//!
//! Turns classifier facts into alert records. Every fact is checked against
//! the store before anything is written, so a pass over unchanged data writes
//! nothing. The first failing gateway call abandons the rest of that
//! deposit's work; the caller moves on to the next deposit.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::classifier::{classify, ExpirationFact, RiskFacts, Thresholds};
use crate::gateway::DepositGateway;
use crate::types::{AlertPriority, AlertType, Deposit, LifecycleState, NewAlert};
use crate::Result;

/// Observation attached to every alert the engine creates
pub const ISSUED_OBSERVATION: &str = "Generated automatically by the alert reconciliation job";

/// Fixed priority of each condition
pub fn priority_for(alert_type: AlertType) -> AlertPriority {
    match alert_type {
        AlertType::Expired => AlertPriority::High,
        AlertType::NearExpiration => AlertPriority::Medium,
        AlertType::HighValue => AlertPriority::Medium,
    }
}

/// What issuance did for one deposit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositOutcome {
    /// Alert types created during this evaluation
    pub created: Vec<AlertType>,
    /// Persisted lifecycle transition (old, new)
    pub state_change: Option<(LifecycleState, LifecycleState)>,
}

/// Creates missing alerts for deposits
pub struct AlertIssuer {
    gateway: Arc<dyn DepositGateway>,
    thresholds: Thresholds,
}

impl AlertIssuer {
    pub fn new(gateway: Arc<dyn DepositGateway>, thresholds: Thresholds) -> Self {
        Self {
            gateway,
            thresholds,
        }
    }

    /// Build the alert for an expiration fact
    fn expiration_alert(deposit: &Deposit, fact: ExpirationFact) -> Option<NewAlert> {
        let (alert_type, message) = match fact {
            ExpirationFact::Expired { days_overdue } => (
                AlertType::Expired,
                format!(
                    "Deposit {} EXPIRED {} days ago",
                    deposit.number, days_overdue
                ),
            ),
            ExpirationFact::NearExpiration { days_remaining } => (
                AlertType::NearExpiration,
                format!(
                    "Deposit {} expires in {} days",
                    deposit.number, days_remaining
                ),
            ),
            ExpirationFact::Clear { .. } => return None,
        };

        Some(NewAlert {
            alert_type,
            priority: priority_for(alert_type),
            message,
            deposit_id: deposit.id.clone(),
            observations: Some(ISSUED_OBSERVATION.to_string()),
        })
    }

    /// Build the alert for a high-value deposit
    fn high_value_alert(&self, deposit: &Deposit, total_value: f64) -> NewAlert {
        NewAlert {
            alert_type: AlertType::HighValue,
            priority: priority_for(AlertType::HighValue),
            message: format!(
                "Deposit {} holds a value of €{:.2}, above the €{:.2} threshold",
                deposit.number, total_value, self.thresholds.high_value
            ),
            deposit_id: deposit.id.clone(),
            observations: Some(ISSUED_OBSERVATION.to_string()),
        }
    }

    /// Alerts warranted by a set of facts
    fn warranted_alerts(&self, deposit: &Deposit, facts: &RiskFacts) -> Vec<NewAlert> {
        let mut alerts: Vec<NewAlert> = facts
            .expiration
            .and_then(|fact| Self::expiration_alert(deposit, fact))
            .into_iter()
            .collect();
        if let Some(total) = facts.high_value {
            alerts.push(self.high_value_alert(deposit, total));
        }
        alerts
    }

    /// Create an alert unless an unresolved one of the same type exists
    ///
    /// Returns whether a new alert was written.
    async fn ensure_alert(&self, alert: NewAlert) -> Result<bool> {
        if let Some(existing) = self
            .gateway
            .find_unresolved_alert(&alert.deposit_id, alert.alert_type)
            .await?
        {
            debug!(
                deposit_id = %alert.deposit_id,
                alert_type = %alert.alert_type,
                alert_id = %existing.id,
                "Unresolved alert already present"
            );
            return Ok(false);
        }

        let created = self.gateway.create_alert(alert).await?;
        info!(
            deposit_id = %created.deposit_id,
            alert_type = %created.alert_type,
            priority = %created.priority,
            alert_id = %created.id,
            "Alert created"
        );
        Ok(true)
    }

    /// Evaluate one deposit: create missing alerts, then refresh its cached state
    pub async fn issue(&self, deposit: &Deposit, now: DateTime<Utc>) -> Result<DepositOutcome> {
        let facts = classify(deposit, now, &self.thresholds)?;
        let mut outcome = DepositOutcome::default();

        for alert in self.warranted_alerts(deposit, &facts) {
            let alert_type = alert.alert_type;
            if self.ensure_alert(alert).await? {
                outcome.created.push(alert_type);
            }
        }

        // Written only after this deposit's alert writes went through
        if deposit.expiration_date.is_some() && facts.state != deposit.state {
            self.gateway
                .save_deposit_state(&deposit.id, facts.state)
                .await?;
            info!(
                deposit_id = %deposit.id,
                deposit_number = %deposit.number,
                old_state = %deposit.state,
                new_state = %facts.state,
                "Deposit state updated"
            );
            outcome.state_change = Some((deposit.state, facts.state));
        }

        Ok(outcome)
    }
}
