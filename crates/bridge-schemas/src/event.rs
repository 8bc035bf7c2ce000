//! Typed change-stream events.
//!
//! Each event is ephemeral: built from one decoded message, consumed by one
//! dispatch, then dropped. Nothing here is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentId};

/// Wire discriminator for a single-document mutation.
pub const TYPE_DOCUMENT_CHANGED: &str = "documentChanged";
/// Wire discriminator for a reconciliation (requery) request.
pub const TYPE_REQUERY_REQUIRED: &str = "requeryRequired";

/// Correlation token attached to a batch of related upstream changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Mutation(MutationEvent),
    Reconciliation(ReconciliationRequest),
}

impl Event {
    pub fn txn_id(&self) -> Option<&TxnId> {
        match self {
            Event::Mutation(m) => m.txn_id.as_ref(),
            Event::Reconciliation(r) => r.txn_id.as_ref(),
        }
    }

    /// Wire discriminator this event was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Mutation(_) => TYPE_DOCUMENT_CHANGED,
            Event::Reconciliation(_) => TYPE_REQUERY_REQUIRED,
        }
    }
}

/// One change to one document in one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub txn_id: Option<TxnId>,
    pub version: Option<u64>,
    pub collection: String,
    pub change: Change,
}

/// Upstream could not deliver full history for these documents; they must be
/// re-fetched and overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRequest {
    pub txn_id: Option<TxnId>,
    pub version: Option<u64>,
    pub documents: Vec<DocumentReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentReference {
    pub collection: String,
    pub document_id: DocumentId,
    /// Upstream application id, when the producer includes it.
    pub app_id: Option<String>,
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.document_id)
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// The write a mutation asks for.
///
/// The wire format folds insert and update into one `upsert` method and uses
/// a null `oldValue` to mean insert; that distinction is made once, at decode
/// time, and carried here as separate variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// `upsert` without a previous value.
    Insert { value: Document },
    /// `upsert` with a previous value; `previous.id` addresses the target.
    Update { previous: Document, value: Document },
    /// `remove`; only `value.id` is used.
    Remove { value: Document },
}

impl Change {
    pub fn method(&self) -> &'static str {
        match self {
            Change::Insert { .. } | Change::Update { .. } => "upsert",
            Change::Remove { .. } => "remove",
        }
    }

    /// Identity of the stored document this change addresses.
    pub fn target_id(&self) -> &DocumentId {
        match self {
            Change::Insert { value } => value.id(),
            Change::Update { previous, .. } => previous.id(),
            Change::Remove { value } => value.id(),
        }
    }
}
