//! Deposit domain type
//!
//! A quantity of a product held at a client site. The engine only reads
//! deposits and writes back the cached lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a deposit
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Active,
    NearExpiration,
    Expired,
    /// Terminal: goods collected from the site
    Withdrawn,
    /// Terminal: goods billed to the client
    Invoiced,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::NearExpiration => "near_expiration",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
            Self::Invoiced => "invoiced",
        }
    }

    /// Terminal states are owned by collaborators and never recomputed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Withdrawn | Self::Invoiced)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deposit as seen by the reconciliation engine
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Deposit {
    /// Store identifier
    pub id: String,

    /// External identifier shown to operators (e.g. "DEP-2025-0000001")
    pub number: String,

    pub quantity: f64,

    pub unit_value: f64,

    pub deposit_date: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    pub active: bool,

    /// Last persisted lifecycle state (a cached projection)
    pub state: LifecycleState,
}

impl Deposit {
    /// Create an active deposit with no expiration date
    pub fn new(id: impl Into<String>, number: impl Into<String>, quantity: f64, unit_value: f64) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            quantity,
            unit_value,
            deposit_date: Utc::now(),
            expiration_date: None,
            active: true,
            state: LifecycleState::Active,
        }
    }

    /// Set the expiration date
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration);
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the stored lifecycle state
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self
    }

    /// Total value held (quantity × unit value)
    pub fn total_value(&self) -> f64 {
        self.quantity * self.unit_value
    }
}
