//! Fan-out of a reconciliation request.
//!
//! Every reference is handled by its own task: query upstream, then overwrite
//! each returned document in the target store. References are independent;
//! a failure on one never affects the others, and nothing is retried.

use std::sync::Arc;

use bridge_db::DocumentStore;
use bridge_schemas::{DocumentReference, TxnId};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::{FindClient, ReconcileError};

/// What happened to one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceOutcome {
    pub collection: String,
    pub document_id: String,
    /// Documents returned by upstream.
    pub fetched: usize,
    /// Documents successfully written to the target store.
    pub written: usize,
    /// Store writes that failed.
    pub write_failures: usize,
    /// Set when the query itself failed.
    pub error: Option<String>,
}

impl ReferenceOutcome {
    fn new(reference: &DocumentReference) -> Self {
        Self {
            collection: reference.collection.clone(),
            document_id: reference.document_id.as_str().to_string(),
            fetched: 0,
            written: 0,
            write_failures: 0,
            error: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.write_failures == 0
    }
}

/// Handles of the tasks spawned for one request.
///
/// Dropping the batch detaches the tasks; they keep running to completion.
#[derive(Debug)]
pub struct ReconcileBatch {
    handles: Vec<(DocumentReference, JoinHandle<ReferenceOutcome>)>,
}

impl ReconcileBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every reference task. A panicked task is reported as a
    /// query failure of the reference it was handling.
    pub async fn join(self) -> Vec<ReferenceOutcome> {
        let mut out = Vec::with_capacity(self.handles.len());
        for (reference, h) in self.handles {
            match h.await {
                Ok(o) => out.push(o),
                Err(e) => {
                    error!(reference = %reference, error = %e, "reconcile task aborted");
                    let mut outcome = ReferenceOutcome::new(&reference);
                    outcome.error = Some(format!("task aborted: {e}"));
                    out.push(outcome);
                }
            }
        }
        out
    }
}

/// Reconciliation client: upstream reads, target-store overwrites.
#[derive(Clone)]
pub struct Reconciler {
    finder: Arc<dyn FindClient>,
    store: Arc<dyn DocumentStore>,
    /// `None` means no bound on concurrently running queries.
    limit: Option<Arc<Semaphore>>,
}

impl Reconciler {
    /// `max_in_flight == 0` disables the concurrency bound.
    pub fn new(finder: Arc<dyn FindClient>, store: Arc<dyn DocumentStore>, max_in_flight: usize) -> Self {
        let limit = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));
        Self {
            finder,
            store,
            limit,
        }
    }

    /// Spawn one task per reference and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, txn_id: Option<TxnId>, references: Vec<DocumentReference>) -> ReconcileBatch {
        let handles = references
            .into_iter()
            .map(|reference| {
                let this = self.clone();
                let txn_id = txn_id.clone();
                let task_reference = reference.clone();
                let handle = tokio::spawn(async move {
                    // the semaphore is never closed, so acquire only fails if that changes
                    let _permit = match &this.limit {
                        Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
                        None => None,
                    };
                    this.reconcile_one(txn_id.as_ref(), &task_reference).await
                });
                (reference, handle)
            })
            .collect();
        ReconcileBatch { handles }
    }

    /// Query one reference and overwrite whatever upstream returns.
    pub async fn reconcile_one(&self, txn_id: Option<&TxnId>, reference: &DocumentReference) -> ReferenceOutcome {
        let mut outcome = ReferenceOutcome::new(reference);
        let txn = txn_id.map(|t| t.as_str()).unwrap_or("-");

        let docs = match self.finder.find(txn_id, &reference.collection).await {
            Ok(docs) => docs,
            Err(e) => {
                match &e {
                    ReconcileError::Application(msg) => error!(
                        txn_id = txn,
                        reference = %reference,
                        message = %msg,
                        "reconcile find returned application error"
                    ),
                    ReconcileError::Query(msg) => error!(
                        txn_id = txn,
                        reference = %reference,
                        error = %msg,
                        "reconcile find request failed"
                    ),
                }
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        outcome.fetched = docs.len();
        for up in docs {
            let doc = match up.into_document() {
                Ok(d) => d,
                Err(e) => {
                    warn!(txn_id = txn, reference = %reference, error = %e, "skipping upstream document");
                    outcome.write_failures += 1;
                    continue;
                }
            };
            match self
                .store
                .replace_one(&reference.collection, doc.id(), &doc, true)
                .await
            {
                Ok(res) => {
                    outcome.written += 1;
                    info!(
                        txn_id = txn,
                        collection = %reference.collection,
                        doc_id = %doc.id(),
                        matched = res.matched,
                        modified = res.modified,
                        upserted = res.upserted,
                        "reconciled document"
                    );
                }
                Err(e) => {
                    outcome.write_failures += 1;
                    error!(
                        txn_id = txn,
                        collection = %reference.collection,
                        doc_id = %doc.id(),
                        error = %e,
                        "reconcile write failed"
                    );
                }
            }
        }
        outcome
    }
}
