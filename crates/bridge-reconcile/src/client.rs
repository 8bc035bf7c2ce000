//! Upstream `find` endpoint client.
//!
//! Request:  `POST {endpoint}/api/v3/store/find`
//!           header `X-DITTO-TXN-ID: <txn>` (when known)
//!           body   `{"collection": "...", "query": "true", "limit": 1}`
//! Response: either `{"message": "..."}` (application error) or
//!           `{"documents": [{"id": "...", "fields": {...}}, ...]}`.

use std::time::Duration;

use bridge_schemas::{Document, DocumentId, TxnId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIND_PATH: &str = "/api/v3/store/find";
pub const TXN_ID_HEADER: &str = "X-DITTO-TXN-ID";

/// Why one reconciliation query produced no documents to write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Transport failure, unexpected status, or undecodable response.
    #[error("find query failed: {0}")]
    Query(String),
    /// The upstream store answered with an application-level error message.
    #[error("find returned error: {0}")]
    Application(String),
}

/// One document as returned by the upstream store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstreamDocument {
    pub id: Value,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl UpstreamDocument {
    /// Flatten to the stored shape `{id, ...fields}`.
    pub fn into_document(self) -> Result<Document, ReconcileError> {
        let id = DocumentId::from_value(&self.id).ok_or_else(|| {
            ReconcileError::Query(format!("upstream document id is not a string/integer: {}", self.id))
        })?;
        Ok(Document::from_upstream(id, self.fields))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FindRequest<'a> {
    pub collection: &'a str,
    pub query: &'a str,
    pub limit: u32,
}

impl<'a> FindRequest<'a> {
    pub fn for_collection(collection: &'a str) -> Self {
        Self {
            collection,
            query: "true",
            limit: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FindResponse {
    message: Option<String>,
    documents: Option<Vec<UpstreamDocument>>,
}

/// Upstream retrieval contract used by the reconciler.
#[async_trait::async_trait]
pub trait FindClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(
        &self,
        txn_id: Option<&TxnId>,
        collection: &str,
    ) -> Result<Vec<UpstreamDocument>, ReconcileError>;
}

// ---------------------------------------------------------------------------
// HttpFindClient
// ---------------------------------------------------------------------------

/// reqwest-backed [`FindClient`].
///
/// The API token is passed in by the caller; it is never logged.
#[derive(Clone)]
pub struct HttpFindClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl std::fmt::Debug for HttpFindClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFindClient")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpFindClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: None,
        }
    }

    /// Build with an optional bearer token and transport timeout.
    /// `timeout = None` leaves reqwest's default (no timeout).
    pub fn with_options(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ReconcileError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| ReconcileError::Query(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_token,
        })
    }

    pub fn find_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), FIND_PATH)
    }
}

#[async_trait::async_trait]
impl FindClient for HttpFindClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn find(
        &self,
        txn_id: Option<&TxnId>,
        collection: &str,
    ) -> Result<Vec<UpstreamDocument>, ReconcileError> {
        let mut req = self
            .http
            .post(self.find_url())
            .json(&FindRequest::for_collection(collection));
        if let Some(txn) = txn_id {
            req = req.header(TXN_ID_HEADER, txn.as_str());
        }
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ReconcileError::Query(format!("request failed: {e}")))?;

        let status = resp.status();
        let body: FindResponse = resp.json().await.map_err(|e| {
            ReconcileError::Query(format!("response json decode failed (status={}): {e}", status.as_u16()))
        })?;

        // an empty message is not an error report
        if let Some(message) = body.message.filter(|m| !m.is_empty()) {
            return Err(ReconcileError::Application(message));
        }
        if !status.is_success() {
            return Err(ReconcileError::Query(format!(
                "http error status={}",
                status.as_u16()
            )));
        }
        body.documents
            .ok_or_else(|| ReconcileError::Query("response has neither `message` nor `documents`".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(FindRequest::for_collection("orders")).unwrap();
        assert_eq!(body, json!({"collection": "orders", "query": "true", "limit": 1}));
    }

    #[test]
    fn find_url_joins_without_double_slash() {
        let c = HttpFindClient::new("https://example.test/");
        assert_eq!(c.find_url(), "https://example.test/api/v3/store/find");
    }

    #[test]
    fn debug_redacts_token() {
        let c = HttpFindClient::with_options("https://example.test", Some("secret-token".into()), None)
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("<REDACTED>"));
    }

    #[test]
    fn upstream_document_flattens_fields() {
        let up: UpstreamDocument =
            serde_json::from_value(json!({"id": "x", "fields": {"a": 1}})).unwrap();
        assert_eq!(up.into_document().unwrap().to_value(), json!({"id": "x", "a": 1}));

        let bad: UpstreamDocument = serde_json::from_value(json!({"id": [1]})).unwrap();
        assert!(matches!(bad.into_document(), Err(ReconcileError::Query(_))));
    }
}
