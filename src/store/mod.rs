//! Storage boundary for the admin service.
//!
//! Everything the dashboard and the promote routine need from a document
//! database goes through `DocumentStore`. `MongoStore` talks to a real
//! deployment; `MemoryStore` keeps collections in process with the same
//! update semantics.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::document::{SearchFilter, UpdateInstruction};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to reach document store: {0}")]
    Connection(String),

    #[error("query on collection '{collection}' failed: {message}")]
    Query { collection: String, message: String },

    #[error("write to collection '{collection}' failed: {message}")]
    Write {
        collection: String,
        message: String,
        transient: bool,
    },

    #[error("document has no _id field")]
    MissingId,

    #[error("cannot set '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

impl StoreError {
    /// Whether repeating the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Connection(_) => true,
            StoreError::Write { transient, .. } => *transient,
            StoreError::Query { .. } | StoreError::MissingId | StoreError::InvalidPath { .. } => {
                false
            }
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all collections in the database.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Documents matching `filter`, skipping `skip` and returning at most
    /// `limit` (0 means no limit).
    async fn find(
        &self,
        collection: &str,
        filter: &SearchFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply `update` as a `$set` to the document with the given id.
    /// Returns whether a document matched.
    async fn update_one(
        &self,
        collection: &str,
        id: &Bson,
        update: &UpdateInstruction,
    ) -> Result<bool, StoreError>;

    /// Insert the document, or overwrite the fields it carries on the
    /// existing document with the same `_id`. Fields present only on the
    /// stored document are kept.
    async fn upsert_by_id(&self, collection: &str, document: &Document) -> Result<(), StoreError>;
}
