//! Reconciliation against a mocked upstream `find` endpoint.
//!
//! No real network: httpmock serves the endpoint, the target store is the
//! in-memory store.

use std::sync::Arc;

use bridge_db::{DocumentStore, MemoryDocumentStore};
use bridge_reconcile::{FindClient, HttpFindClient, ReconcileError, Reconciler, UpstreamDocument};
use bridge_schemas::{Document, DocumentId, DocumentReference, TxnId};
use httpmock::prelude::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reference(collection: &str, id: &str) -> DocumentReference {
    DocumentReference {
        collection: collection.to_string(),
        document_id: DocumentId::new(id),
        app_id: None,
    }
}

fn find_body(collection: &str) -> serde_json::Value {
    json!({"collection": collection, "query": "true", "limit": 1})
}

// ---------------------------------------------------------------------------
// HttpFindClient
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_sends_txn_header_and_body_and_parses_documents() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/store/find")
                // header names travel lowercased
                .header("x-ditto-txn-id", "t-1")
                .json_body(find_body("orders"));
            then.status(200)
                .json_body(json!({"documents": [{"id": "o1", "fields": {"status": "new"}}]}));
        })
        .await;

    let client = HttpFindClient::new(server.base_url());
    let docs = client
        .find(Some(&TxnId::new("t-1")), "orders")
        .await
        .expect("find ok");

    m.assert_async().await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, json!("o1"));
}

#[tokio::test]
async fn find_message_field_is_application_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/store/find");
            then.status(400).json_body(json!({"message": "collection not found"}));
        })
        .await;

    let client = HttpFindClient::new(server.base_url());
    let err = client.find(None, "orders").await.unwrap_err();
    assert_eq!(err, ReconcileError::Application("collection not found".to_string()));
}

#[tokio::test]
async fn find_empty_message_is_not_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/store/find");
            then.status(200)
                .json_body(json!({"message": "", "documents": [{"id": "o1", "fields": {}}]}));
        })
        .await;

    let client = HttpFindClient::new(server.base_url());
    let docs = client.find(None, "orders").await.expect("find ok");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, json!("o1"));
}

#[tokio::test]
async fn find_garbage_body_is_query_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/store/find");
            then.status(502).body("<html>bad gateway</html>");
        })
        .await;

    let client = HttpFindClient::new(server.base_url());
    let err = client.find(None, "orders").await.unwrap_err();
    assert!(matches!(err, ReconcileError::Query(_)), "got {err:?}");
}

#[tokio::test]
async fn find_sends_bearer_token_when_configured() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/store/find")
                .header("authorization", "Bearer tkn");
            then.status(200).json_body(json!({"documents": []}));
        })
        .await;

    let client = HttpFindClient::with_options(server.base_url(), Some("tkn".to_string()), None).unwrap();
    let docs = client.find(None, "orders").await.unwrap();
    m.assert_async().await;
    assert!(docs.is_empty());
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconciliation_overwrites_local_document_exactly() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/store/find")
                .json_body(find_body("things"));
            then.status(200)
                .json_body(json!({"documents": [{"id": "x", "fields": {"a": 1}}]}));
        })
        .await;

    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert_one(
            "things",
            &Document::from_value(json!({"id": "x", "a": 0, "stale": true})).unwrap(),
        )
        .await
        .unwrap();

    let reconciler = Reconciler::new(
        Arc::new(HttpFindClient::new(server.base_url())),
        store.clone(),
        0,
    );
    let outcomes = reconciler
        .dispatch(Some(TxnId::new("t-9")), vec![reference("things", "x")])
        .join()
        .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_clean());
    assert_eq!(outcomes[0].written, 1);

    let got = store.find_one("things", &"x".into()).await.unwrap().unwrap();
    assert_eq!(got.to_value(), json!({"id": "x", "a": 1}));
}

#[tokio::test]
async fn failing_reference_does_not_block_the_others() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/store/find")
                .json_body(find_body("broken"));
            then.status(200).json_body(json!({"message": "boom"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/store/find")
                .json_body(find_body("orders"));
            then.status(200)
                .json_body(json!({"documents": [{"id": "o1", "fields": {"status": "new"}}]}));
        })
        .await;

    let store = Arc::new(MemoryDocumentStore::new());
    let reconciler = Reconciler::new(Arc::new(HttpFindClient::new(server.base_url())), store.clone(), 1);

    let outcomes = reconciler
        .dispatch(None, vec![reference("broken", "b1"), reference("orders", "o1")])
        .join()
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].error.as_deref(), Some("find returned error: boom"));
    assert!(outcomes[1].is_clean());
    assert_eq!(store.count("broken").await, 0);
    assert_eq!(store.count("orders").await, 1);
}

#[tokio::test]
async fn store_failure_is_counted_not_raised() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/store/find");
            then.status(200)
                .json_body(json!({"documents": [{"id": "o1", "fields": {}}]}));
        })
        .await;

    let store = Arc::new(MemoryDocumentStore::new());
    store.set_fail_writes(true);
    let reconciler = Reconciler::new(Arc::new(HttpFindClient::new(server.base_url())), store.clone(), 4);

    let outcomes = reconciler
        .dispatch(None, vec![reference("orders", "o1")])
        .join()
        .await;

    assert_eq!(outcomes[0].fetched, 1);
    assert_eq!(outcomes[0].written, 0);
    assert_eq!(outcomes[0].write_failures, 1);
    assert!(!outcomes[0].is_clean());
}

/// Find client whose task dies mid-query.
struct PanickingFind;

#[async_trait::async_trait]
impl FindClient for PanickingFind {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn find(&self, _txn: Option<&TxnId>, _collection: &str) -> Result<Vec<UpstreamDocument>, ReconcileError> {
        panic!("find client blew up");
    }
}

#[tokio::test]
async fn panicked_task_outcome_names_its_reference() {
    let store = Arc::new(MemoryDocumentStore::new());
    let reconciler = Reconciler::new(Arc::new(PanickingFind), store, 0);

    let outcomes = reconciler
        .dispatch(None, vec![reference("orders", "o1"), reference("cars", "c9")])
        .join()
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!((outcomes[0].collection.as_str(), outcomes[0].document_id.as_str()), ("orders", "o1"));
    assert_eq!((outcomes[1].collection.as_str(), outcomes[1].document_id.as_str()), ("cars", "c9"));
    assert!(outcomes
        .iter()
        .all(|o| o.error.as_deref().is_some_and(|e| e.starts_with("task aborted"))));
}
