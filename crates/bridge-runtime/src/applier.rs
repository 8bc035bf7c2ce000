//! Mutation applier: exactly one change, exactly one collection, one write.
//!
//! Every path is idempotent under redelivery:
//! - insert overwrites an existing document with the same id
//! - update upserts by the previous value's id
//! - remove of an absent document deletes nothing and succeeds

use bridge_db::{DeleteOutcome, DocumentStore, InsertOutcome, ReplaceOutcome, StoreError};
use bridge_schemas::Change;
use serde::Serialize;

/// Result of the single write a change produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOutcome {
    Insert(InsertOutcome),
    Replace(ReplaceOutcome),
    Delete(DeleteOutcome),
}

pub async fn apply_change(
    store: &dyn DocumentStore,
    collection: &str,
    change: &Change,
) -> Result<WriteOutcome, StoreError> {
    match change {
        Change::Insert { value } => store.insert_one(collection, value).await.map(WriteOutcome::Insert),
        Change::Update { previous, value } => store
            .replace_one(collection, previous.id(), value, true)
            .await
            .map(WriteOutcome::Replace),
        Change::Remove { value } => store
            .delete_one(collection, value.id())
            .await
            .map(WriteOutcome::Delete),
    }
}
