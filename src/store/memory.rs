use super::{DocumentStore, StoreError};
use crate::document::{SearchFilter, UpdateInstruction, ID_FIELD};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// In-process `DocumentStore`.
///
/// Collections keep insertion order. Dotted paths in updates create
/// intermediate documents the way MongoDB's `$set` does. Failures can be
/// injected to exercise error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Vec<Document>>,
    offline: bool,
    rejected_ids: HashSet<String>,
    transient_write_failures: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document to a collection, creating it if needed.
    pub fn insert(&self, collection: &str, document: Document) {
        self.inner
            .write()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .read()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &Bson) -> Option<Document> {
        self.inner
            .read()
            .collections
            .get(collection)?
            .iter()
            .find(|doc| doc.get(ID_FIELD) == Some(id))
            .cloned()
    }

    /// When offline, every operation fails with a transient connection error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.write().offline = offline;
    }

    /// Make every write to the document with this id fail permanently.
    pub fn reject_writes_to(&self, id: &Bson) {
        self.inner.write().rejected_ids.insert(id.to_string());
    }

    /// Make the next `count` writes fail with a transient error.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.write().transient_write_failures = count;
    }

    fn check_online(inner: &Inner) -> Result<(), StoreError> {
        if inner.offline {
            return Err(StoreError::Connection("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(inner: &mut Inner, collection: &str, id: &Bson) -> Result<(), StoreError> {
        Self::check_online(inner)?;
        if inner.transient_write_failures > 0 {
            inner.transient_write_failures -= 1;
            return Err(StoreError::Write {
                collection: collection.to_string(),
                message: "write conflict".to_string(),
                transient: true,
            });
        }
        if inner.rejected_ids.contains(&id.to_string()) {
            return Err(StoreError::Write {
                collection: collection.to_string(),
                message: format!("write rejected for {}", id),
                transient: false,
            });
        }
        Ok(())
    }
}

/// Set `value` at a dotted `path`, creating intermediate documents.
fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty path segment"));
    }
    if segments[0] == ID_FIELD {
        return Err(invalid("_id is immutable"));
    }

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| invalid("empty path"))?;

    let mut current = document;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Bson::Document(Document::new()));
        current = match entry {
            Bson::Document(inner) => inner,
            _ => return Err(invalid(&format!("'{}' is not a document", segment))),
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read();
        Self::check_online(&inner)?;
        Ok(inner.collections.keys().cloned().collect())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &SearchFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.read();
        Self::check_online(&inner)?;

        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = match limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };

        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .skip(skip)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &Bson,
        update: &UpdateInstruction,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        Self::check_writable(&mut inner, collection, id)?;

        let Some(document) = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.get(ID_FIELD) == Some(id)))
        else {
            return Ok(false);
        };

        // Validate every path before touching the stored document
        let mut updated = document.clone();
        for (path, value) in update.iter() {
            set_path(&mut updated, path, Bson::String(value.to_string()))?;
        }
        *document = updated;
        Ok(true)
    }

    async fn upsert_by_id(&self, collection: &str, document: &Document) -> Result<(), StoreError> {
        let id = document.get(ID_FIELD).ok_or(StoreError::MissingId)?;

        let mut inner = self.inner.write();
        Self::check_writable(&mut inner, collection, id)?;

        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|doc| doc.get(ID_FIELD) == Some(id)) {
            Some(existing) => {
                for (key, value) in document {
                    if key != ID_FIELD {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
            None => docs.push(document.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{build_search_filter, build_update_instruction, EditedValues};
    use mongodb::bson::doc;

    fn instruction(pairs: &[(&str, &str)]) -> UpdateInstruction {
        let edited: EditedValues = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        build_update_instruction(&edited)
    }

    // ==================== set_path Tests ====================

    #[test]
    fn test_set_path_top_level() {
        let mut document = doc! { "title": "old" };
        set_path(&mut document, "title", "new".into()).expect("Should set");
        assert_eq!(document, doc! { "title": "new" });
    }

    #[test]
    fn test_set_path_creates_intermediate_documents() {
        let mut document = doc! { "title": "Hello" };
        set_path(&mut document, "translations.fr.title", "Bonjour".into()).expect("Should set");

        assert_eq!(
            document.get_document("translations").unwrap(),
            &doc! { "fr": { "title": "Bonjour" } }
        );
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut document = doc! { "translations": "oops" };
        let err = set_path(&mut document, "translations.fr.title", "x".into()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }

    #[test]
    fn test_set_path_rejects_id_and_empty_segments() {
        let mut document = doc! { "_id": 1 };
        assert!(set_path(&mut document, "_id", "2".into()).is_err());
        assert!(set_path(&mut document, "a..b", "2".into()).is_err());
        assert_eq!(document, doc! { "_id": 1 });
    }

    // ==================== Store Tests ====================

    #[tokio::test]
    async fn test_list_collections_sorted() {
        let store = MemoryStore::new();
        store.insert("posts", doc! { "_id": 1 });
        store.insert("authors", doc! { "_id": 1 });

        let names = store.list_collections().await.unwrap();
        assert_eq!(names, vec!["authors", "posts"]);
    }

    #[tokio::test]
    async fn test_find_applies_filter_skip_and_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert("posts", doc! { "_id": i, "title": format!("post {}", i) });
        }
        store.insert("posts", doc! { "_id": 99, "title": "other" });

        let filter = build_search_filter("POST", ["title"]);
        let page = store.find("posts", &filter, 1, 2).await.unwrap();

        let ids: Vec<_> = page.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_find_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        let docs = store
            .find("missing", &SearchFilter::MatchAll, 0, 10)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_update_one_sets_nested_translation() {
        let store = MemoryStore::new();
        store.insert("posts", doc! { "_id": 1, "title": "Hello" });

        let matched = store
            .update_one(
                "posts",
                &Bson::Int32(1),
                &instruction(&[("title", "Hi"), ("translations.zh-TW.title", "嗨")]),
            )
            .await
            .unwrap();

        assert!(matched);
        assert_eq!(
            store.get("posts", &Bson::Int32(1)).unwrap(),
            doc! { "_id": 1, "title": "Hi", "translations": { "zh-TW": { "title": "嗨" } } }
        );
    }

    #[tokio::test]
    async fn test_update_one_missing_document() {
        let store = MemoryStore::new();
        store.insert("posts", doc! { "_id": 1 });

        let matched = store
            .update_one("posts", &Bson::Int32(2), &instruction(&[("title", "x")]))
            .await
            .unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn test_update_one_invalid_path_leaves_document_untouched() {
        let store = MemoryStore::new();
        store.insert("posts", doc! { "_id": 1, "title": "Hello", "translations": 5 });

        let result = store
            .update_one(
                "posts",
                &Bson::Int32(1),
                &instruction(&[("title", "Hi"), ("translations.fr.title", "Salut")]),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(
            store.get("posts", &Bson::Int32(1)).unwrap(),
            doc! { "_id": 1, "title": "Hello", "translations": 5 }
        );
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_merges() {
        let store = MemoryStore::new();
        store.insert("posts", doc! { "_id": 1, "title": "old", "release_only": true });

        store
            .upsert_by_id("posts", &doc! { "_id": 1, "title": "new" })
            .await
            .unwrap();
        store
            .upsert_by_id("posts", &doc! { "_id": 2, "title": "fresh" })
            .await
            .unwrap();

        assert_eq!(
            store.get("posts", &Bson::Int32(1)).unwrap(),
            doc! { "_id": 1, "title": "new", "release_only": true }
        );
        assert_eq!(store.documents("posts").len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_without_id() {
        let store = MemoryStore::new();
        let err = store
            .upsert_by_id("posts", &doc! { "title": "x" })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingId));
    }

    #[tokio::test]
    async fn test_offline_store_fails_transiently() {
        let store = MemoryStore::new();
        store.set_offline(true);

        let err = store.list_collections().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fail_next_writes_is_transient_and_runs_out() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);

        let err = store
            .upsert_by_id("posts", &doc! { "_id": 1, "title": "x" })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.documents("posts").is_empty());

        store
            .upsert_by_id("posts", &doc! { "_id": 1, "title": "x" })
            .await
            .unwrap();
        assert_eq!(store.documents("posts").len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_write_is_permanent() {
        let store = MemoryStore::new();
        store.reject_writes_to(&Bson::Int32(7));

        let err = store
            .upsert_by_id("posts", &doc! { "_id": 7 })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(store.documents("posts").is_empty());
    }
}
