//! bridge-db
//!
//! Target document store. The bridge only ever needs three keyed writes
//! (insert-one, replace-one-with-upsert, delete-one) plus a point read used by
//! tests and operators, so that is the whole [`DocumentStore`] contract.
//!
//! Two implementations:
//! - [`PgDocumentStore`]: Postgres, one JSONB row per (collection, id).
//! - [`MemoryDocumentStore`]: in-process, for tests and dry runs.

mod memory;
mod pg;

pub use memory::MemoryDocumentStore;
pub use pg::{connect, connect_from_env, migrate, status, DbStatus, PgDocumentStore, ENV_DB_URL};

use bridge_schemas::{Document, DocumentId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Write outcomes (observability only; never alter control flow)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InsertOutcome {
    /// `true` when no document with this id existed before the write.
    pub inserted: bool,
    /// `true` when an existing document was overwritten instead.
    pub overwritten: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReplaceOutcome {
    pub matched: u64,
    /// Zero when the stored content was already identical.
    pub modified: u64,
    /// `true` when the upsert created the document.
    pub upserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeleteOutcome {
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A write the target store rejected.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Replacement would change the stored document's identity.
    #[error("replacement for '{target}' carries a different id '{replacement}'")]
    IdMismatch {
        target: DocumentId,
        replacement: DocumentId,
    },
    /// Connectivity, constraint violation or any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Keyed document writes against the target database.
///
/// One handle is shared by every partition worker and reconciliation task;
/// implementations must be safe for concurrent use. No locking beyond what the
/// backend does itself is implied.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Create `doc`. An existing document with the same id is overwritten.
    async fn insert_one(&self, collection: &str, doc: &Document) -> Result<InsertOutcome, StoreError>;

    /// Replace the full content of the document addressed by `id` with `doc`,
    /// creating it when absent and `upsert` is set.
    async fn replace_one(
        &self,
        collection: &str,
        id: &DocumentId,
        doc: &Document,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError>;

    /// Delete the document addressed by `id`. Absent is not an error.
    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<DeleteOutcome, StoreError>;

    async fn find_one(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError>;
}

/// Shared guard: a replacement may never change identity.
pub(crate) fn ensure_same_id(id: &DocumentId, doc: &Document) -> Result<(), StoreError> {
    if doc.id() != id {
        return Err(StoreError::IdMismatch {
            target: id.clone(),
            replacement: doc.id().clone(),
        });
    }
    Ok(())
}
