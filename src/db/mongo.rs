//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::db::schemas::Metadata;
use crate::types::WatchError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client and verify the connection
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, WatchError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| WatchError::Persistence(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| WatchError::Persistence(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, WatchError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, WatchError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), WatchError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| WatchError::Persistence(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, WatchError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| WatchError::Persistence(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| WatchError::Persistence("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, WatchError> {
        self.inner
            .find_one(live_filter(filter))
            .await
            .map_err(|e| WatchError::Persistence(format!("Find failed: {}", e)))
    }

    /// Find every live document matching the filter
    ///
    /// Documents are fetched raw and decoded one by one, so a malformed
    /// document is reported in [`Fetched::unreadable`] instead of failing or
    /// vanishing from the listing.
    pub async fn find_many(&self, filter: Document) -> Result<Fetched<T>, WatchError> {
        let docs: Vec<Document> = self
            .inner
            .clone_with_type::<Document>()
            .find(live_filter(filter))
            .await
            .map_err(|e| WatchError::Persistence(format!("Find failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| WatchError::Persistence(format!("Cursor failed: {}", e)))?;

        Ok(decode_documents(docs))
    }

    /// Ids of every live document matching the filter, without decoding the schema
    pub async fn find_ids(&self, filter: Document) -> Result<Vec<ObjectId>, WatchError> {
        let docs: Vec<Document> = self
            .inner
            .clone_with_type::<Document>()
            .find(live_filter(filter))
            .projection(id_projection())
            .await
            .map_err(|e| WatchError::Persistence(format!("Find failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| WatchError::Persistence(format!("Cursor failed: {}", e)))?;

        Ok(object_ids(&docs))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, WatchError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| WatchError::Persistence(format!("Update failed: {}", e)))
    }

    /// Update every document matching the filter
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, WatchError> {
        self.inner
            .update_many(filter, update.into())
            .await
            .map_err(|e| WatchError::Persistence(format!("Bulk update failed: {}", e)))
    }

    /// Hard delete every document matching the filter
    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult, WatchError> {
        self.inner
            .delete_many(filter)
            .await
            .map_err(|e| WatchError::Persistence(format!("Delete failed: {}", e)))
    }
}

/// A document that could not be decoded into its schema
#[derive(Debug, Clone, PartialEq)]
pub struct Unreadable {
    /// `_id` of the raw document, when it had an ObjectId one
    pub id: Option<ObjectId>,
    pub reason: String,
}

/// Result of a lenient multi-document read
#[derive(Debug)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    pub unreadable: Vec<Unreadable>,
}

/// Restrict a filter to documents not soft-deleted
pub fn live_filter(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

/// Projection returning only `_id`
pub fn id_projection() -> Document {
    doc! { "_id": 1 }
}

/// ObjectId `_id`s of raw documents; anything else is skipped
pub fn object_ids(docs: &[Document]) -> Vec<ObjectId> {
    docs.iter()
        .filter_map(|d| match d.get_object_id("_id") {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Document without an ObjectId _id: {}", e);
                None
            }
        })
        .collect()
}

/// Decode raw documents, keeping the failures
pub fn decode_documents<T: DeserializeOwned>(docs: Vec<Document>) -> Fetched<T> {
    let mut fetched = Fetched {
        items: Vec::with_capacity(docs.len()),
        unreadable: Vec::new(),
    };
    for doc in docs {
        let id = doc.get_object_id("_id").ok();
        match bson::from_document::<T>(doc) {
            Ok(item) => fetched.items.push(item),
            Err(e) => fetched.unreadable.push(Unreadable {
                id,
                reason: e.to_string(),
            }),
        }
    }
    fetched
}
