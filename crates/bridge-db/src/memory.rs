//! In-process document store.
//!
//! Same write semantics as the Postgres store. Writes can be switched to fail
//! so callers can exercise the store-error path without a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bridge_schemas::{Document, DocumentId};
use tokio::sync::RwLock;

use crate::{
    ensure_same_id, DeleteOutcome, DocumentStore, InsertOutcome, ReplaceOutcome, StoreError,
};

type Collection = BTreeMap<DocumentId, Document>;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    fail_writes: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns `StoreError::Backend`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Copy of a whole collection, ordered by id.
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Document count per non-empty collection.
    pub async fn collection_counts(&self) -> BTreeMap<String, usize> {
        self.collections
            .read()
            .await
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(name, c)| (name.clone(), c.len()))
            .collect()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store: writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_one(&self, collection: &str, doc: &Document) -> Result<InsertOutcome, StoreError> {
        self.check_writable()?;
        let mut guard = self.collections.write().await;
        let prev = guard
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id().clone(), doc.clone());
        Ok(InsertOutcome {
            inserted: prev.is_none(),
            overwritten: prev.is_some(),
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &DocumentId,
        doc: &Document,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.check_writable()?;
        ensure_same_id(id, doc)?;

        let mut guard = self.collections.write().await;
        let coll = guard.entry(collection.to_string()).or_default();
        match coll.get_mut(id) {
            Some(existing) => {
                let modified = u64::from(*existing != *doc);
                *existing = doc.clone();
                Ok(ReplaceOutcome {
                    matched: 1,
                    modified,
                    upserted: false,
                })
            }
            None if upsert => {
                coll.insert(id.clone(), doc.clone());
                Ok(ReplaceOutcome {
                    matched: 0,
                    modified: 0,
                    upserted: true,
                })
            }
            None => Ok(ReplaceOutcome::default()),
        }
    }

    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<DeleteOutcome, StoreError> {
        self.check_writable()?;
        let mut guard = self.collections.write().await;
        let deleted = guard
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .map(|_| 1)
            .unwrap_or(0);
        Ok(DeleteOutcome { deleted })
    }

    async fn find_one(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }
}
