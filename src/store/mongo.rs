use super::{DocumentStore, StoreError};
use crate::document::{SearchFilter, UpdateInstruction, ID_FIELD};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, RETRYABLE_WRITE_ERROR};
use mongodb::{Client, Collection, Database};
use tracing::debug;

/// `DocumentStore` backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect to `uri` and bind to database `db_name`.
    ///
    /// The driver connects lazily, so an unreachable server surfaces on the
    /// first operation rather than here.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            db: client.database(db_name),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn is_transient(err: &MongoError) -> bool {
    err.contains_label(RETRYABLE_WRITE_ERROR)
        || matches!(
            *err.kind,
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. }
        )
}

fn query_error(collection: &str, err: MongoError) -> StoreError {
    if is_transient(&err) {
        return StoreError::Connection(err.to_string());
    }
    StoreError::Query {
        collection: collection.to_string(),
        message: err.to_string(),
    }
}

fn write_error(collection: &str, err: MongoError) -> StoreError {
    StoreError::Write {
        collection: collection.to_string(),
        transient: is_transient(&err),
        message: err.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self
            .db
            .list_collection_names()
            .await
            .map_err(|e| query_error(self.db.name(), e))?;
        names.sort();
        Ok(names)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &SearchFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, StoreError> {
        debug!("find in {} ({}), skip={} limit={}", collection, filter, skip, limit);

        let cursor = self
            .collection(collection)
            .find(filter.to_query())
            .skip(skip)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|e| query_error(collection, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| query_error(collection, e))
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &Bson,
        update: &UpdateInstruction,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": update.to_set_fields() })
            .await
            .map_err(|e| write_error(collection, e))?;

        Ok(result.matched_count > 0)
    }

    async fn upsert_by_id(&self, collection: &str, document: &Document) -> Result<(), StoreError> {
        let id = document.get(ID_FIELD).ok_or(StoreError::MissingId)?.clone();

        let mut fields = document.clone();
        fields.remove(ID_FIELD);

        // `$set` rejects an empty document
        let update = if fields.is_empty() {
            doc! { "$setOnInsert": { "_id": id.clone() } }
        } else {
            doc! { "$set": fields }
        };

        self.collection(collection)
            .update_one(doc! { "_id": id }, update)
            .upsert(true)
            .await
            .map_err(|e| write_error(collection, e))?;

        Ok(())
    }
}
