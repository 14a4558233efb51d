//! Alert document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{Alert, AlertPriority, AlertType, NewAlert, WatchError};

/// Collection name for alerts
pub const ALERT_COLLECTION: &str = "alerts";

/// Alert document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AlertDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub alert_type: AlertType,

    #[serde(default)]
    pub priority: AlertPriority,

    pub message: String,

    pub deposit_id: ObjectId,

    #[serde(default)]
    pub resolved: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,

    pub created_at: DateTime,
}

impl Default for AlertDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            alert_type: AlertType::HighValue,
            priority: AlertPriority::Medium,
            message: String::new(),
            deposit_id: ObjectId::new(),
            resolved: false,
            resolved_at: None,
            observations: None,
            created_at: DateTime::now(),
        }
    }
}

impl AlertDoc {
    /// Build an unresolved alert document
    pub fn from_new(alert: NewAlert) -> Result<Self, WatchError> {
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            alert_type: alert.alert_type,
            priority: alert.priority,
            message: alert.message,
            deposit_id: ObjectId::parse_str(&alert.deposit_id)?,
            resolved: false,
            resolved_at: None,
            observations: alert.observations,
            created_at: DateTime::now(),
        })
    }
}

impl TryFrom<AlertDoc> for Alert {
    type Error = WatchError;

    fn try_from(doc: AlertDoc) -> Result<Self, Self::Error> {
        let id = doc
            ._id
            .ok_or_else(|| WatchError::Persistence("Alert document without _id".into()))?;

        Ok(Alert {
            id: id.to_hex(),
            alert_type: doc.alert_type,
            priority: doc.priority,
            message: doc.message,
            deposit_id: doc.deposit_id.to_hex(),
            resolved: doc.resolved,
            resolved_at: doc.resolved_at.map(|d| d.to_chrono()),
            observations: doc.observations,
            created_at: doc.created_at.to_chrono(),
        })
    }
}

impl IntoIndexes for AlertDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Query-before-create lookup and bulk resolution
            (
                doc! { "deposit_id": 1, "alert_type": 1, "resolved": 1 },
                Some(
                    IndexOptions::builder()
                        .name("deposit_type_resolved_index".to_string())
                        .build(),
                ),
            ),
            // Retention purge
            (
                doc! { "resolved": 1, "resolved_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("resolved_at_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "priority": 1, "resolved": 1 },
                Some(
                    IndexOptions::builder()
                        .name("priority_resolved_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AlertDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
