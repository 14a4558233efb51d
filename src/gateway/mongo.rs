//! MongoDB gateway
//!
//! Implements [`DepositGateway`] over the `deposits` and `alerts`
//! collections. Deposit ids cross the seam as hex-encoded ObjectIds.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{ActiveDeposits, DepositGateway};
use crate::db::schemas::{AlertDoc, DepositDoc, Metadata, ALERT_COLLECTION, DEPOSIT_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{
    Alert, AlertFilter, AlertType, Deposit, LifecycleState, NewAlert, ResolutionPatch, WatchError,
};
use crate::Result;

/// Gateway backed by MongoDB
pub struct MongoGateway {
    deposits: MongoCollection<DepositDoc>,
    alerts: MongoCollection<AlertDoc>,
}

impl MongoGateway {
    /// Open both collections, applying their indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let deposits = mongo.collection::<DepositDoc>(DEPOSIT_COLLECTION).await?;
        let alerts = mongo.collection::<AlertDoc>(ALERT_COLLECTION).await?;
        info!(db = mongo.db_name(), "Mongo gateway ready");
        Ok(Self { deposits, alerts })
    }

    fn parse_ids(ids: &[String]) -> Result<Vec<ObjectId>> {
        ids.iter()
            .map(|id| ObjectId::parse_str(id).map_err(WatchError::from))
            .collect()
    }
}

#[async_trait]
impl DepositGateway for MongoGateway {
    async fn list_active_deposits(&self) -> Result<ActiveDeposits> {
        let fetched = self.deposits.find_many(doc! { "active": true }).await?;

        let mut listing = ActiveDeposits::default();
        for unreadable in fetched.unreadable {
            listing.unreadable.push(unreadable_deposit(unreadable.id, unreadable.reason));
        }
        for doc in fetched.items {
            let id = doc._id;
            match Deposit::try_from(doc) {
                Ok(deposit) => listing.deposits.push(deposit),
                Err(e) => listing.unreadable.push(unreadable_deposit(id, e.to_string())),
            }
        }

        if !listing.unreadable.is_empty() {
            warn!(
                count = listing.unreadable.len(),
                "Active deposit documents could not be decoded"
            );
        }
        Ok(listing)
    }

    async fn list_obsolete_deposit_ids(&self) -> Result<Vec<String>> {
        let ids = self
            .deposits
            .find_ids(obsolete_deposit_filter())
            .await?
            .into_iter()
            .map(|id| id.to_hex())
            .collect();

        Ok(ids)
    }

    async fn find_unresolved_alert(
        &self,
        deposit_id: &str,
        alert_type: AlertType,
    ) -> Result<Option<Alert>> {
        let deposit_oid = ObjectId::parse_str(deposit_id)?;
        let found = self
            .alerts
            .find_one(doc! {
                "deposit_id": deposit_oid,
                "alert_type": alert_type.as_str(),
                "resolved": false,
            })
            .await?;

        found.map(Alert::try_from).transpose()
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        let mut doc = AlertDoc::from_new(alert)?;
        let id = self.alerts.insert_one(doc.clone()).await?;
        doc._id = Some(id);
        debug!(alert_id = %id, "Inserted alert");
        Alert::try_from(doc)
    }

    async fn bulk_resolve_alerts(&self, filter: AlertFilter, patch: ResolutionPatch) -> Result<u64> {
        if filter.deposit_ids.is_empty() {
            return Ok(0);
        }

        let deposit_oids: Vec<Bson> = Self::parse_ids(&filter.deposit_ids)?
            .into_iter()
            .map(Bson::ObjectId)
            .collect();

        let mut query = doc! {
            "deposit_id": { "$in": deposit_oids },
            "resolved": false,
            "metadata.is_deleted": { "$ne": true },
        };
        if let Some(types) = &filter.alert_types {
            let types: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            query.insert("alert_type", doc! { "$in": types });
        }

        let mut set = doc! {
            "resolved": true,
            "resolved_at": DateTime::from_chrono(patch.resolved_at),
            "observations": patch.observations,
        };
        set.insert(Metadata::UPDATED_AT_PATH, DateTime::now());

        let result = self.alerts.update_many(query, doc! { "$set": set }).await?;
        Ok(result.modified_count)
    }

    async fn save_deposit_state(&self, deposit_id: &str, state: LifecycleState) -> Result<()> {
        let deposit_oid = ObjectId::parse_str(deposit_id)?;

        let mut set = doc! { "state": state.as_str() };
        set.insert(Metadata::UPDATED_AT_PATH, DateTime::now());

        let result = self
            .deposits
            .update_one(doc! { "_id": deposit_oid }, doc! { "$set": set })
            .await?;

        if result.matched_count == 0 {
            return Err(WatchError::Persistence(format!(
                "deposit {} not found",
                deposit_id
            )));
        }
        Ok(())
    }

    async fn purge_resolved_alerts(&self, resolved_before: chrono::DateTime<Utc>) -> Result<u64> {
        let result = self
            .alerts
            .delete_many(doc! {
                "resolved": true,
                "resolved_at": { "$lt": DateTime::from_chrono(resolved_before) },
            })
            .await?;
        Ok(result.deleted_count)
    }
}

/// Deposits whose alerts no longer apply: inactive, or in a terminal state
///
/// Matched on raw fields only, so a document that fails to decode as a
/// deposit is still found and its alerts still get resolved.
pub fn obsolete_deposit_filter() -> Document {
    doc! {
        "$or": [
            { "active": false },
            { "state": { "$in": [
                LifecycleState::Withdrawn.as_str(),
                LifecycleState::Invoiced.as_str(),
            ] } },
        ]
    }
}

fn unreadable_deposit(id: Option<ObjectId>, reason: impl Into<String>) -> WatchError {
    let deposit_id = id.map_or_else(|| "<missing _id>".to_string(), |id| id.to_hex());
    WatchError::classification(deposit_id, reason)
}
