//! In-memory gateway
//!
//! Process-local deposit/alert store used by tests and by dev mode when
//! MongoDB is unavailable. Supports fault injection and write accounting so
//! partial failures and re-entrancy can be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{ActiveDeposits, DepositGateway};
use crate::types::{
    Alert, AlertFilter, AlertType, Deposit, LifecycleState, NewAlert, ResolutionPatch, WatchError,
};
use crate::Result;

/// Injected failures
#[derive(Debug, Default)]
struct Faults {
    create_alert: HashSet<String>,
    save_state: HashSet<String>,
    list_active: bool,
    list_obsolete: bool,
}

/// In-memory implementation of [`DepositGateway`]
#[derive(Default)]
pub struct InMemoryGateway {
    deposits: RwLock<HashMap<String, Deposit>>,
    /// Active records that exist but cannot be read, with the reason
    unreadable: RwLock<BTreeMap<String, String>>,
    alerts: RwLock<Vec<Alert>>,
    faults: RwLock<Faults>,
    write_calls: AtomicU64,
    listing_stalled: AtomicBool,
    listing_released: Notify,
    listing_entered: Notify,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a deposit
    pub async fn insert_deposit(&self, deposit: Deposit) {
        self.deposits
            .write()
            .await
            .insert(deposit.id.clone(), deposit);
    }

    /// Mutate a stored deposit in place; returns false when it does not exist
    pub async fn update_deposit<F>(&self, deposit_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Deposit),
    {
        match self.deposits.write().await.get_mut(deposit_id) {
            Some(deposit) => {
                update(deposit);
                true
            }
            None => false,
        }
    }

    /// Store an active deposit record that cannot be read back
    pub async fn insert_unreadable_deposit(&self, deposit_id: &str, reason: &str) {
        self.unreadable
            .write()
            .await
            .insert(deposit_id.to_string(), reason.to_string());
    }

    pub async fn deposit(&self, deposit_id: &str) -> Option<Deposit> {
        self.deposits.read().await.get(deposit_id).cloned()
    }

    /// Seed an alert directly, bypassing the engine
    pub async fn insert_alert(&self, alert: Alert) {
        self.alerts.write().await.push(alert);
    }

    /// Snapshot of every stored alert
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// Unresolved alerts of one deposit
    pub async fn unresolved_alerts_for(&self, deposit_id: &str) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| a.deposit_id == deposit_id && !a.resolved)
            .cloned()
            .collect()
    }

    /// Number of write calls served (creates, bulk resolutions, state saves, purges)
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Make `create_alert` fail for one deposit
    pub async fn fail_create_alert_for(&self, deposit_id: &str) {
        self.faults
            .write()
            .await
            .create_alert
            .insert(deposit_id.to_string());
    }

    /// Make `save_deposit_state` fail for one deposit
    pub async fn fail_save_state_for(&self, deposit_id: &str) {
        self.faults
            .write()
            .await
            .save_state
            .insert(deposit_id.to_string());
    }

    /// Make `list_active_deposits` fail
    pub async fn fail_active_listing(&self, fail: bool) {
        self.faults.write().await.list_active = fail;
    }

    /// Make `list_obsolete_deposit_ids` fail
    pub async fn fail_obsolete_listing(&self, fail: bool) {
        self.faults.write().await.list_obsolete = fail;
    }

    pub async fn clear_faults(&self) {
        *self.faults.write().await = Faults::default();
    }

    /// Block `list_active_deposits` until [`release_listing`](Self::release_listing)
    pub fn stall_listing(&self) {
        self.listing_stalled.store(true, Ordering::SeqCst);
    }

    pub fn release_listing(&self) {
        self.listing_stalled.store(false, Ordering::SeqCst);
        self.listing_released.notify_waiters();
    }

    /// Wait until some caller has entered `list_active_deposits`
    pub async fn listing_entered(&self) {
        self.listing_entered.notified().await;
    }

    fn record_write(&self) {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DepositGateway for InMemoryGateway {
    async fn list_active_deposits(&self) -> Result<ActiveDeposits> {
        self.listing_entered.notify_one();

        while self.listing_stalled.load(Ordering::SeqCst) {
            let released = self.listing_released.notified();
            if !self.listing_stalled.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        if self.faults.read().await.list_active {
            return Err(WatchError::Persistence(
                "injected failure listing active deposits".into(),
            ));
        }

        let mut deposits: Vec<Deposit> = self
            .deposits
            .read()
            .await
            .values()
            .filter(|d| d.active)
            .cloned()
            .collect();
        deposits.sort_by(|a, b| a.id.cmp(&b.id));

        let mut listing = ActiveDeposits::new(deposits);
        listing.unreadable = self
            .unreadable
            .read()
            .await
            .iter()
            .map(|(id, reason)| WatchError::classification(id.as_str(), reason.as_str()))
            .collect();
        Ok(listing)
    }

    async fn list_obsolete_deposit_ids(&self) -> Result<Vec<String>> {
        if self.faults.read().await.list_obsolete {
            return Err(WatchError::Persistence(
                "injected failure listing obsolete deposits".into(),
            ));
        }

        let mut ids: Vec<String> = self
            .deposits
            .read()
            .await
            .values()
            .filter(|d| !d.active || d.state.is_terminal())
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_unresolved_alert(
        &self,
        deposit_id: &str,
        alert_type: AlertType,
    ) -> Result<Option<Alert>> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .find(|a| a.deposit_id == deposit_id && a.alert_type == alert_type && !a.resolved)
            .cloned())
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        if self.faults.read().await.create_alert.contains(&alert.deposit_id) {
            return Err(WatchError::Persistence(format!(
                "injected failure creating alert for deposit {}",
                alert.deposit_id
            )));
        }

        self.record_write();
        let created = Alert {
            id: Uuid::new_v4().to_string(),
            alert_type: alert.alert_type,
            priority: alert.priority,
            message: alert.message,
            deposit_id: alert.deposit_id,
            resolved: false,
            resolved_at: None,
            observations: alert.observations,
            created_at: Utc::now(),
        };
        self.alerts.write().await.push(created.clone());
        debug!(alert_id = %created.id, "Stored alert in memory");
        Ok(created)
    }

    async fn bulk_resolve_alerts(&self, filter: AlertFilter, patch: ResolutionPatch) -> Result<u64> {
        self.record_write();
        let mut modified = 0;
        for alert in self.alerts.write().await.iter_mut() {
            if filter.matches(alert) {
                alert.resolved = true;
                alert.resolved_at = Some(patch.resolved_at);
                alert.observations = Some(patch.observations.clone());
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn save_deposit_state(&self, deposit_id: &str, state: LifecycleState) -> Result<()> {
        if self.faults.read().await.save_state.contains(deposit_id) {
            return Err(WatchError::Persistence(format!(
                "injected failure saving state for deposit {}",
                deposit_id
            )));
        }

        self.record_write();
        match self.deposits.write().await.get_mut(deposit_id) {
            Some(deposit) => {
                deposit.state = state;
                Ok(())
            }
            None => Err(WatchError::Persistence(format!(
                "deposit {} not found",
                deposit_id
            ))),
        }
    }

    async fn purge_resolved_alerts(&self, resolved_before: DateTime<Utc>) -> Result<u64> {
        self.record_write();
        let mut alerts = self.alerts.write().await;
        let before = alerts.len();
        alerts.retain(|a| !(a.resolved && a.resolved_at.is_some_and(|at| at < resolved_before)));
        Ok((before - alerts.len()) as u64)
    }
}
