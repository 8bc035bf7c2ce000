//! bridge-schemas
//!
//! Document model, change-stream event model and the event decoder.
//! Pure types and parsing; no IO.

pub mod decode;
pub mod document;
pub mod event;

pub use decode::{decode_event, decode_event_value, EventError};
pub use document::{Document, DocumentId, InvalidDocument, ID_FIELD};
pub use event::{
    Change, DocumentReference, Event, MutationEvent, ReconciliationRequest, TxnId,
    TYPE_DOCUMENT_CHANGED, TYPE_REQUERY_REQUIRED,
};
