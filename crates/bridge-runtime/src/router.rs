//! Event router: decoded event -> mutation applier | reconciliation client.
//!
//! Mutations are awaited so their effect lands before the next message of the
//! partition is pulled. Reconciliation fan-out is detached; a monitor task
//! folds its per-reference outcomes into the shared stats.

use bridge_schemas::{Event, MutationEvent, ReconciliationRequest};
use tracing::{error, info, warn};

use crate::applier::{apply_change, WriteOutcome};
use crate::context::BridgeContext;

/// What the router did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Applied(WriteOutcome),
    /// Store rejected the write. Logged; the message still counts as consumed.
    WriteFailed(String),
    /// Reconciliation tasks were spawned for this many references.
    ReconcileDispatched(usize),
}

pub async fn route_event(ctx: &BridgeContext, event: Event) -> Routed {
    match event {
        Event::Mutation(m) => route_mutation(ctx, m).await,
        Event::Reconciliation(r) => route_reconciliation(ctx, r),
    }
}

async fn route_mutation(ctx: &BridgeContext, m: MutationEvent) -> Routed {
    let txn = m.txn_id.as_ref().map(|t| t.as_str()).unwrap_or("-");
    let doc_id = m.change.target_id().clone();

    match apply_change(ctx.store.as_ref(), &m.collection, &m.change).await {
        Ok(outcome) => {
            ctx.stats.record_mutation_applied();
            match outcome {
                WriteOutcome::Insert(o) => info!(
                    txn_id = txn,
                    collection = %m.collection,
                    doc_id = %doc_id,
                    inserted = o.inserted,
                    overwritten = o.overwritten,
                    "document inserted"
                ),
                WriteOutcome::Replace(o) => info!(
                    txn_id = txn,
                    collection = %m.collection,
                    doc_id = %doc_id,
                    matched = o.matched,
                    modified = o.modified,
                    upserted = o.upserted,
                    "document replaced"
                ),
                WriteOutcome::Delete(o) => info!(
                    txn_id = txn,
                    collection = %m.collection,
                    doc_id = %doc_id,
                    deleted = o.deleted,
                    "document removed"
                ),
            }
            Routed::Applied(outcome)
        }
        Err(e) => {
            // Not retried, not re-queued.
            ctx.stats.record_store_failure();
            error!(
                txn_id = txn,
                collection = %m.collection,
                doc_id = %doc_id,
                method = m.change.method(),
                error = %e,
                "store write failed; change dropped"
            );
            Routed::WriteFailed(e.to_string())
        }
    }
}

fn route_reconciliation(ctx: &BridgeContext, r: ReconciliationRequest) -> Routed {
    ctx.stats.record_reconcile_request();
    let n = r.documents.len();
    if n == 0 {
        warn!(txn_id = ?r.txn_id, "reconciliation request names no documents");
        return Routed::ReconcileDispatched(0);
    }
    info!(txn_id = ?r.txn_id, references = n, "dispatching reconciliation");

    let batch = ctx.reconciler.dispatch(r.txn_id, r.documents);
    ctx.stats.record_references_dispatched(n as u64);
    let stats = ctx.stats.clone();
    tokio::spawn(async move {
        for outcome in batch.join().await {
            stats.record_documents_reconciled(outcome.written as u64);
            if outcome.is_clean() {
                stats.record_reference_reconciled();
            } else {
                stats.record_reference_failed();
            }
        }
    });
    Routed::ReconcileDispatched(n)
}
