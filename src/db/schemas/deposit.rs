//! Deposit document schema
//!
//! Deposits are owned by the deposit-management service; this engine reads
//! them and writes back only the cached `state` field.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{Deposit, LifecycleState, WatchError};

/// Collection name for deposits
pub const DEPOSIT_COLLECTION: &str = "deposits";

/// Deposit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DepositDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// External identifier, e.g. "DEP-2025-0000001"
    #[serde(default)]
    pub deposit_number: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ObjectId>,

    /// Client site holding the goods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<ObjectId>,

    pub quantity: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_value: Option<f64>,

    /// Denormalized quantity × unit value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<f64>,

    pub deposit_date: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime>,

    #[serde(default)]
    pub state: LifecycleState,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Default for DepositDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            deposit_number: String::new(),
            product_id: None,
            site_id: None,
            quantity: 0.0,
            unit_value: None,
            total_value: None,
            deposit_date: DateTime::now(),
            expiration_date: None,
            state: LifecycleState::Active,
            active: true,
            notes: None,
        }
    }
}

impl DepositDoc {
    /// Unit value, falling back to the denormalized total when it was never set
    pub fn effective_unit_value(&self) -> f64 {
        match (self.unit_value, self.total_value) {
            (Some(unit), _) => unit,
            (None, Some(total)) if self.quantity > 0.0 => total / self.quantity,
            _ => 0.0,
        }
    }
}

impl TryFrom<DepositDoc> for Deposit {
    type Error = WatchError;

    fn try_from(doc: DepositDoc) -> Result<Self, Self::Error> {
        let id = doc
            ._id
            .ok_or_else(|| WatchError::Persistence("Deposit document without _id".into()))?;
        let unit_value = doc.effective_unit_value();

        Ok(Deposit {
            id: id.to_hex(),
            number: doc.deposit_number,
            quantity: doc.quantity,
            unit_value,
            deposit_date: doc.deposit_date.to_chrono(),
            expiration_date: doc.expiration_date.map(|d| d.to_chrono()),
            active: doc.active,
            state: doc.state,
        })
    }
}

impl IntoIndexes for DepositDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "deposit_number": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("deposit_number_unique".to_string())
                        .build(),
                ),
            ),
            // Active listing and the obsolescence sweep
            (
                doc! { "active": 1, "state": 1 },
                Some(
                    IndexOptions::builder()
                        .name("active_state_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "expiration_date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("expiration_date_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for DepositDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
