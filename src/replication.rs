//! Promote a collection from one store to another.
//!
//! Every document of the source collection is upserted into the destination
//! collection by `_id`, one batch at a time. Failures are collected into a
//! `ReplicationReport` instead of ending the run silently, and the report
//! carries a checkpoint offset so an interrupted run can be resumed.

use crate::document::{SearchFilter, ID_FIELD};
use crate::retry::{with_retry_if, RetryConfig};
use crate::store::{DocumentStore, StoreError};
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};
use serde::Serialize;
use std::str::FromStr;
use tracing::{info, warn};

/// What to do when a document cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop at the first failed document.
    AbortOnFirstError,
    /// Record the failure and keep going.
    ContinueOnError,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(FailureMode::AbortOnFirstError),
            "continue" => Ok(FailureMode::ContinueOnError),
            other => Err(format!(
                "unknown failure mode '{}', expected 'abort' or 'continue'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    pub batch_size: u64,
    pub failure_mode: FailureMode,
    /// Number of source documents to skip, from a previous report's
    /// `next_offset`.
    pub start_offset: u64,
    pub retry: RetryConfig,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            failure_mode: FailureMode::AbortOnFirstError,
            start_offset: 0,
            retry: RetryConfig::store_write(),
        }
    }
}

/// A document that could not be promoted.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    /// The document id as relaxed extended JSON, `None` when the failure was
    /// not tied to a single document.
    pub id: Option<serde_json::Value>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub collection: String,
    pub succeeded: u64,
    pub failed: Vec<FailedDocument>,
    pub aborted: bool,
    /// Source offset to resume from.
    pub next_offset: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReplicationReport {
    /// True when every document was written and the run was not cut short.
    pub fn is_complete(&self) -> bool {
        !self.aborted && self.failed.is_empty()
    }
}

fn id_json(id: &Bson) -> serde_json::Value {
    id.clone().into_relaxed_extjson()
}

async fn promote_document(
    destination: &dyn DocumentStore,
    collection: &str,
    document: &Document,
    retry: &RetryConfig,
) -> Result<(), StoreError> {
    let operation = format!("Upsert into {}", collection);
    with_retry_if(
        retry,
        &operation,
        || destination.upsert_by_id(collection, document),
        StoreError::is_transient,
    )
    .await
}

/// Copy every document of `collection` from `source` to `destination`.
pub async fn promote_collection(
    source: &dyn DocumentStore,
    destination: &dyn DocumentStore,
    collection: &str,
    options: &ReplicationOptions,
) -> ReplicationReport {
    let batch_size = options.batch_size.max(1);
    let mut report = ReplicationReport {
        collection: collection.to_string(),
        succeeded: 0,
        failed: Vec::new(),
        aborted: false,
        next_offset: options.start_offset,
        started_at: Utc::now(),
        finished_at: Utc::now(),
    };

    info!(
        "Promoting collection {} from offset {} (batch size {}, {:?})",
        collection, options.start_offset, batch_size, options.failure_mode
    );

    'batches: loop {
        let batch = match source
            .find(collection, &SearchFilter::MatchAll, report.next_offset, batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Reading {} at offset {} failed: {}", collection, report.next_offset, e);
                report.failed.push(FailedDocument {
                    id: None,
                    reason: e.to_string(),
                });
                report.aborted = true;
                break;
            }
        };

        if batch.is_empty() {
            break;
        }

        let fetched = batch.len() as u64;
        for document in &batch {
            let result = match document.get(ID_FIELD) {
                Some(id) => promote_document(destination, collection, document, &options.retry)
                    .await
                    .map_err(|e| (Some(id_json(id)), e)),
                None => Err((None, StoreError::MissingId)),
            };

            match result {
                Ok(()) => report.succeeded += 1,
                Err((id, e)) => {
                    warn!("Failed to promote document {:?} in {}: {}", id, collection, e);
                    report.failed.push(FailedDocument {
                        id,
                        reason: e.to_string(),
                    });
                    if options.failure_mode == FailureMode::AbortOnFirstError {
                        report.aborted = true;
                        break 'batches;
                    }
                }
            }
            report.next_offset += 1;
        }

        info!(
            "Promoted batch of {} from {} ({} ok, {} failed so far)",
            fetched,
            collection,
            report.succeeded,
            report.failed.len()
        );

        if fetched < batch_size {
            break;
        }
    }

    report.finished_at = Utc::now();
    if report.is_complete() {
        info!("✓ Promoted {} documents in {}", report.succeeded, collection);
    } else {
        warn!(
            "Promotion of {} finished with {} failures (aborted: {}, resume at {})",
            collection,
            report.failed.len(),
            report.aborted,
            report.next_offset
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use mongodb::bson::doc;
    use std::time::Duration;

    fn seeded_source(count: i32) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..count {
            store.insert("posts", doc! { "_id": i, "title": format!("post {}", i) });
        }
        store
    }

    fn options(batch_size: u64, failure_mode: FailureMode) -> ReplicationOptions {
        ReplicationOptions {
            batch_size,
            failure_mode,
            start_offset: 0,
            retry: RetryConfig::new(2, Duration::from_millis(1)),
        }
    }

    #[test]
    fn test_failure_mode_from_str() {
        assert_eq!("abort".parse(), Ok(FailureMode::AbortOnFirstError));
        assert_eq!("continue".parse(), Ok(FailureMode::ContinueOnError));
        assert!("retry".parse::<FailureMode>().is_err());
    }

    #[tokio::test]
    async fn test_promotes_all_documents_across_batches() {
        let source = seeded_source(7);
        let destination = MemoryStore::new();

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(3, FailureMode::AbortOnFirstError),
        )
        .await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.next_offset, 7);
        assert_eq!(destination.documents("posts"), source.documents("posts"));
    }

    #[tokio::test]
    async fn test_batch_size_equal_to_count_terminates() {
        let source = seeded_source(4);
        let destination = MemoryStore::new();

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(4, FailureMode::AbortOnFirstError),
        )
        .await;

        assert_eq!(report.succeeded, 4);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let report = promote_collection(
            &MemoryStore::new(),
            &MemoryStore::new(),
            "posts",
            &ReplicationOptions::default(),
        )
        .await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded, 0);
    }

    #[tokio::test]
    async fn test_existing_destination_fields_are_kept() {
        let source = seeded_source(1);
        let destination = MemoryStore::new();
        destination.insert("posts", doc! { "_id": 0, "title": "stale", "published": true });

        promote_collection(&source, &destination, "posts", &ReplicationOptions::default()).await;

        assert_eq!(
            destination.get("posts", &Bson::Int32(0)).unwrap(),
            doc! { "_id": 0, "title": "post 0", "published": true }
        );
    }

    #[tokio::test]
    async fn test_abort_on_first_error_stops_with_checkpoint() {
        let source = seeded_source(5);
        let destination = MemoryStore::new();
        destination.reject_writes_to(&Bson::Int32(2));

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(2, FailureMode::AbortOnFirstError),
        )
        .await;

        assert!(report.aborted);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, Some(serde_json::json!(2)));
        // Resuming retries the failed document
        assert_eq!(report.next_offset, 2);
        assert_eq!(destination.documents("posts").len(), 2);
    }

    #[tokio::test]
    async fn test_continue_on_error_aggregates_failures() {
        let source = seeded_source(5);
        let destination = MemoryStore::new();
        destination.reject_writes_to(&Bson::Int32(1));
        destination.reject_writes_to(&Bson::Int32(3));

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(2, FailureMode::ContinueOnError),
        )
        .await;

        assert!(!report.aborted);
        assert!(!report.is_complete());
        assert_eq!(report.succeeded, 3);
        let failed_ids: Vec<_> = report.failed.iter().map(|f| f.id.clone()).collect();
        assert_eq!(
            failed_ids,
            vec![Some(serde_json::json!(1)), Some(serde_json::json!(3))]
        );
        assert_eq!(report.next_offset, 5);
    }

    #[tokio::test]
    async fn test_document_without_id_is_reported() {
        let source = MemoryStore::new();
        source.insert("posts", doc! { "title": "orphan" });
        source.insert("posts", doc! { "_id": 1, "title": "fine" });
        let destination = MemoryStore::new();

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(10, FailureMode::ContinueOnError),
        )
        .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].id.is_none());
        assert_eq!(report.failed[0].reason, "document has no _id field");
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let source = seeded_source(6);
        let destination = MemoryStore::new();

        let mut resume = options(4, FailureMode::AbortOnFirstError);
        resume.start_offset = 4;
        let report = promote_collection(&source, &destination, "posts", &resume).await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.next_offset, 6);
        let ids: Vec<_> = destination
            .documents("posts")
            .iter()
            .map(|d| d.get_i32("_id").unwrap())
            .collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_unreachable_source_aborts() {
        let source = seeded_source(3);
        source.set_offline(true);

        let report = promote_collection(
            &source,
            &MemoryStore::new(),
            "posts",
            &options(10, FailureMode::ContinueOnError),
        )
        .await;

        assert!(report.aborted);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].id.is_none());
    }

    #[tokio::test]
    async fn test_transient_write_failure_is_retried() {
        let source = seeded_source(1);
        let destination = MemoryStore::new();
        destination.fail_next_writes(1);

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(10, FailureMode::AbortOnFirstError),
        )
        .await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded, 1);
        assert!(report.failed.is_empty());
        assert_eq!(destination.documents("posts"), source.documents("posts"));
    }

    #[tokio::test]
    async fn test_transient_failures_past_max_attempts_are_recorded() {
        let source = seeded_source(2);
        let destination = MemoryStore::new();
        // Two attempts per document: both attempts for _id 0 fail
        destination.fail_next_writes(2);

        let report = promote_collection(
            &source,
            &destination,
            "posts",
            &options(10, FailureMode::ContinueOnError),
        )
        .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, Some(serde_json::json!(0)));
        assert!(report.failed[0].reason.contains("write conflict"));
        assert!(destination.get("posts", &Bson::Int32(0)).is_none());
        assert!(destination.get("posts", &Bson::Int32(1)).is_some());
    }

    #[tokio::test]
    async fn test_report_serialization() {
        let report = promote_collection(
            &seeded_source(1),
            &MemoryStore::new(),
            "posts",
            &ReplicationOptions::default(),
        )
        .await;
        let json = serde_json::to_value(&report).expect("Should serialize");

        assert_eq!(json["collection"], "posts");
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["aborted"], false);
    }
}
