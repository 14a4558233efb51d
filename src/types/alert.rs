//! Alert domain types
//!
//! An alert represents one risk condition tied to one deposit. The engine
//! keeps at most one unresolved alert per (deposit, type).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk condition an alert reports
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NearExpiration,
    Expired,
    HighValue,
}

impl AlertType {
    pub const ALL: [AlertType; 3] = [Self::NearExpiration, Self::Expired, Self::HighValue];

    /// Types tied to the expiration deadline
    pub const EXPIRATION: [AlertType; 2] = [Self::NearExpiration, Self::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearExpiration => "near_expiration",
            Self::Expired => "expired",
            Self::HighValue => "high_value",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert priority
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted alert
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    pub deposit_id: String,
    pub resolved: bool,
    /// Set only once the alert is resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for an alert about to be created
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    pub deposit_id: String,
    pub observations: Option<String>,
}

/// Selects unresolved alerts for a bulk resolution
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertFilter {
    /// Deposits whose alerts are targeted
    pub deposit_ids: Vec<String>,
    /// Restrict to these types; `None` targets every type
    pub alert_types: Option<Vec<AlertType>>,
}

impl AlertFilter {
    /// Every unresolved alert of the given deposits
    pub fn for_deposits(deposit_ids: Vec<String>) -> Self {
        Self {
            deposit_ids,
            alert_types: None,
        }
    }

    /// Restrict the filter to a set of alert types
    pub fn with_types(mut self, types: &[AlertType]) -> Self {
        self.alert_types = Some(types.to_vec());
        self
    }

    /// Whether an alert is selected (unresolved alerts only)
    pub fn matches(&self, alert: &Alert) -> bool {
        !alert.resolved
            && self.deposit_ids.iter().any(|id| id == &alert.deposit_id)
            && self
                .alert_types
                .as_ref()
                .map_or(true, |types| types.contains(&alert.alert_type))
    }
}

/// Fields written when alerts are resolved
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionPatch {
    pub resolved_at: DateTime<Utc>,
    pub observations: String,
}

impl ResolutionPatch {
    pub fn new(resolved_at: DateTime<Utc>, observations: impl Into<String>) -> Self {
        Self {
            resolved_at,
            observations: observations.into(),
        }
    }
}
