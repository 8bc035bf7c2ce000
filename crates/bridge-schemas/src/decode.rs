//! Event decoder: raw message payload -> typed [`Event`].
//!
//! Decoding is two-step. The `type` discriminator is read first so an
//! unknown-but-well-formed event can be told apart from a malformed one; the
//! variant body is then deserialized into wire structs. Required fields are
//! strict; optional envelope fields (`txnId`, `version`, `appId`) are lenient
//! and an ill-typed value is logged and dropped.

use serde::Deserialize;
use serde_json::Value;

use crate::document::{Document, DocumentId};
use crate::event::{
    Change, DocumentReference, Event, MutationEvent, ReconciliationRequest, TxnId,
    TYPE_DOCUMENT_CHANGED, TYPE_REQUERY_REQUIRED,
};

/// Why a payload did not yield an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Not parseable, or missing / ill-typed required fields.
    #[error("malformed event: {0}")]
    Malformed(String),
    /// Well-formed envelope whose `type` this bridge does not handle.
    #[error("unrecognized event type '{discriminator}'")]
    Unrecognized { discriminator: String },
}

impl EventError {
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, EventError::Unrecognized { .. })
    }

    fn malformed(msg: impl Into<String>) -> Self {
        EventError::Malformed(msg.into())
    }
}

/// Decode one raw payload. Pure apart from a warning on dropped envelope fields.
pub fn decode_event(payload: &[u8]) -> Result<Event, EventError> {
    let root: Value = serde_json::from_slice(payload)
        .map_err(|e| EventError::malformed(format!("invalid json: {e}")))?;
    decode_event_value(root)
}

/// Decode an already-parsed JSON value.
pub fn decode_event_value(root: Value) -> Result<Event, EventError> {
    let obj = root
        .as_object()
        .ok_or_else(|| EventError::malformed("payload is not a JSON object"))?;

    let discriminator = match obj.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(EventError::malformed("`type` must be a string")),
        None => return Err(EventError::malformed("missing `type` discriminator")),
    };

    match discriminator.as_str() {
        TYPE_DOCUMENT_CHANGED => {
            let wire: MutationWire = serde_json::from_value(root)
                .map_err(|e| EventError::malformed(format!("{TYPE_DOCUMENT_CHANGED}: {e}")))?;
            wire.into_event().map(Event::Mutation)
        }
        TYPE_REQUERY_REQUIRED => {
            let wire: RequeryWire = serde_json::from_value(root)
                .map_err(|e| EventError::malformed(format!("{TYPE_REQUERY_REQUIRED}: {e}")))?;
            wire.into_event().map(Event::Reconciliation)
        }
        _ => Err(EventError::Unrecognized { discriminator }),
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// `txnId` arrives as a string from some producers and as a number from others.
fn lenient_txn_id(raw: Option<Value>) -> Option<TxnId> {
    match raw? {
        Value::Null => None,
        Value::String(s) => Some(TxnId::new(s)),
        Value::Number(n) => Some(TxnId::new(n.to_string())),
        other => {
            tracing::warn!(value = %other, "ignoring ill-typed txnId");
            None
        }
    }
}

fn lenient_version(raw: Option<Value>) -> Option<u64> {
    match raw? {
        Value::Null => None,
        v => match v.as_u64() {
            Some(n) => Some(n),
            None => {
                tracing::warn!(value = %v, "ignoring ill-typed version");
                None
            }
        },
    }
}

fn lenient_app_id(raw: Option<Value>) -> Option<String> {
    match raw? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => {
            tracing::warn!(value = %other, "ignoring ill-typed appId");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationWire {
    #[serde(default)]
    txn_id: Option<Value>,
    #[serde(default)]
    version: Option<Value>,
    collection: String,
    change: ChangeWire,
}

impl MutationWire {
    fn into_event(self) -> Result<MutationEvent, EventError> {
        if self.collection.trim().is_empty() {
            return Err(EventError::malformed("`collection` must not be empty"));
        }
        let change = match self.change {
            ChangeWire::Upsert {
                old_value: None,
                new_value,
            } => Change::Insert { value: new_value },
            ChangeWire::Upsert {
                old_value: Some(previous),
                new_value,
            } => Change::Update {
                previous,
                value: new_value,
            },
            ChangeWire::Remove { value } => Change::Remove { value },
        };
        Ok(MutationEvent {
            txn_id: lenient_txn_id(self.txn_id),
            version: lenient_version(self.version),
            collection: self.collection,
            change,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
enum ChangeWire {
    Upsert {
        // null and absent both mean "insert"
        #[serde(rename = "oldValue", default)]
        old_value: Option<Document>,
        #[serde(rename = "newValue")]
        new_value: Document,
    },
    Remove {
        value: Document,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequeryWire {
    #[serde(default)]
    txn_id: Option<Value>,
    #[serde(default)]
    version: Option<Value>,
    documents: Vec<ReferenceWire>,
}

impl RequeryWire {
    fn into_event(self) -> Result<ReconciliationRequest, EventError> {
        let mut documents = Vec::with_capacity(self.documents.len());
        for (i, r) in self.documents.into_iter().enumerate() {
            if r.collection_name.trim().is_empty() {
                return Err(EventError::malformed(format!(
                    "documents[{i}].collectionName must not be empty"
                )));
            }
            let document_id = DocumentId::from_value(&r.document_id).ok_or_else(|| {
                EventError::malformed(format!(
                    "documents[{i}].documentId must be a string or an integer"
                ))
            })?;
            documents.push(DocumentReference {
                collection: r.collection_name,
                document_id,
                app_id: lenient_app_id(r.app_id),
            });
        }
        Ok(ReconciliationRequest {
            txn_id: lenient_txn_id(self.txn_id),
            version: lenient_version(self.version),
            documents,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceWire {
    collection_name: String,
    document_id: Value,
    #[serde(default)]
    app_id: Option<Value>,
}
