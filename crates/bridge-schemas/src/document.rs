//! Canonical document representation shared by every bridge component.
//!
//! A document is an open, ordered string-keyed map. The only field the bridge
//! ever interprets is `id`, the cross-system identity key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identity field carried by every document.
pub const ID_FIELD: &str = "id";

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// Identity key of a document. Stable across the upstream store and the
/// target store; it is the join key for every write.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret a JSON value as an identity key.
    ///
    /// Strings are taken verbatim, integers use their decimal text, so `42`
    /// and `"42"` name the same document. Floats and everything else are not
    /// usable keys: their text form is not stable across JSON encoders.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored document: `id` plus any number of additional fields.
///
/// Construction always validates `id`, so holders of a `Document` never need
/// to re-check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Document {
    id: DocumentId,
    fields: Map<String, Value>,
}

impl Document {
    /// Build a document from a raw JSON object. Fails when `id` is missing
    /// or is not a string/integer.
    pub fn from_map(fields: Map<String, Value>) -> Result<Self, InvalidDocument> {
        let id = match fields.get(ID_FIELD) {
            None | Some(Value::Null) => return Err(InvalidDocument::MissingId),
            Some(v) => DocumentId::from_value(v).ok_or(InvalidDocument::BadIdType)?,
        };
        Ok(Self { id, fields })
    }

    /// Build a document from any JSON value (must be an object).
    pub fn from_value(v: Value) -> Result<Self, InvalidDocument> {
        match v {
            Value::Object(map) => Self::from_map(map),
            _ => Err(InvalidDocument::NotAnObject),
        }
    }

    /// Assemble `{id, ...fields}` from an upstream `{id, fields}` record.
    /// An `id` key inside `fields` is overridden by the outer id.
    pub fn from_upstream(id: DocumentId, fields: Map<String, Value>) -> Self {
        let mut map = fields;
        map.insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
        Self { id, fields: map }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Full field map, including `id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl TryFrom<Map<String, Value>> for Document {
    type Error = InvalidDocument;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(map)
    }
}

impl From<Document> for Map<String, Value> {
    fn from(doc: Document) -> Self {
        doc.fields
    }
}

/// Why a JSON value could not become a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDocument {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("document has no `id` field")]
    MissingId,
    #[error("document `id` must be a string or an integer")]
    BadIdType,
}
