//! Persistence gateway
//!
//! The engine's only view of the deposit and alert store. There are no
//! transactions at this seam: the at-most-one-unresolved-alert invariant is
//! upheld by always querying before creating, from a single scheduler.
//!
//! ## Implementations
//!
//! - [`MongoGateway`]: production store backed by MongoDB
//! - [`InMemoryGateway`]: process-local store for tests and dev mode

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    Alert, AlertFilter, AlertType, Deposit, LifecycleState, NewAlert, ResolutionPatch, WatchError,
};
use crate::Result;

pub mod memory;
pub mod mongo;

pub use memory::InMemoryGateway;
pub use mongo::MongoGateway;

/// Active deposits as read from the store
///
/// Stored deposits that exist but cannot be read are reported in
/// `unreadable` as classification errors carrying the deposit id, so a pass
/// counts them instead of losing them.
#[derive(Debug, Default)]
pub struct ActiveDeposits {
    pub deposits: Vec<Deposit>,
    pub unreadable: Vec<WatchError>,
}

impl ActiveDeposits {
    pub fn new(deposits: Vec<Deposit>) -> Self {
        Self {
            deposits,
            unreadable: Vec::new(),
        }
    }

    /// Every stored active deposit, readable or not
    pub fn len(&self) -> usize {
        self.deposits.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read/write access to deposits and alerts
#[async_trait]
pub trait DepositGateway: Send + Sync {
    /// All deposits with the active flag set
    async fn list_active_deposits(&self) -> Result<ActiveDeposits>;

    /// Ids of deposits that are inactive or in a terminal lifecycle state
    async fn list_obsolete_deposit_ids(&self) -> Result<Vec<String>>;

    /// The unresolved alert of a given type for a deposit, if any
    async fn find_unresolved_alert(
        &self,
        deposit_id: &str,
        alert_type: AlertType,
    ) -> Result<Option<Alert>>;

    /// Persist a new, unresolved alert
    async fn create_alert(&self, alert: NewAlert) -> Result<Alert>;

    /// Resolve every unresolved alert matching the filter, returning how many changed
    async fn bulk_resolve_alerts(&self, filter: AlertFilter, patch: ResolutionPatch) -> Result<u64>;

    /// Overwrite the cached lifecycle state of a deposit
    async fn save_deposit_state(&self, deposit_id: &str, state: LifecycleState) -> Result<()>;

    /// Delete alerts resolved before the cutoff, returning how many were removed
    async fn purge_resolved_alerts(&self, resolved_before: DateTime<Utc>) -> Result<u64>;
}
