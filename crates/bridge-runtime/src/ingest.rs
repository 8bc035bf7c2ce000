//! Ingestion loop.
//!
//! One loop per partition. Within a partition messages are handled strictly
//! one at a time in arrival order: decode, route, wait for the mutation write
//! to finish, commit, then pull the next message. Partitions are independent
//! of each other.
//!
//! Nothing a single message can do stops the loop. Decode failures,
//! unrecognized events and store errors are logged and the message is
//! committed as consumed.

use anyhow::Result;
use bridge_schemas::decode_event;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::BridgeContext;
use crate::router::{route_event, Routed};
use crate::source::{InboundMessage, MessageSource};

/// Per-loop tallies, returned when the source ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub handled: u64,
    pub empty_payloads: u64,
    pub decode_failures: u64,
    pub unrecognized: u64,
    pub applied: u64,
    pub write_failures: u64,
    pub reconcile_requests: u64,
}

/// Decode and route one message. Never fails; every outcome is tallied.
pub async fn handle_message(ctx: &BridgeContext, msg: &InboundMessage, tally: &mut LoopStats) {
    ctx.stats.record_received();
    tally.handled += 1;

    let Some(payload) = msg.payload.as_deref() else {
        ctx.stats.record_empty_payload();
        tally.empty_payloads += 1;
        warn!(partition = msg.partition, offset = msg.offset, "empty message payload; skipped");
        return;
    };
    debug!(
        partition = msg.partition,
        offset = msg.offset,
        payload = %String::from_utf8_lossy(payload),
        "received message"
    );

    let event = match decode_event(payload) {
        Ok(ev) => ev,
        Err(e) if e.is_unrecognized() => {
            ctx.stats.record_unrecognized();
            tally.unrecognized += 1;
            warn!(partition = msg.partition, offset = msg.offset, error = %e, "unrecognized event dropped");
            return;
        }
        Err(e) => {
            ctx.stats.record_decode_failure();
            tally.decode_failures += 1;
            error!(partition = msg.partition, offset = msg.offset, error = %e, "failed to decode message; dropped");
            return;
        }
    };

    match route_event(ctx, event).await {
        Routed::Applied(_) => tally.applied += 1,
        Routed::WriteFailed(_) => tally.write_failures += 1,
        Routed::ReconcileDispatched(_) => tally.reconcile_requests += 1,
    }
}

/// Drive one partition until its source ends.
///
/// Only a failing source (read or commit) ends the loop early.
pub async fn run_partition<S>(ctx: BridgeContext, mut source: S) -> Result<LoopStats>
where
    S: MessageSource,
{
    let partition = source.partition();
    let mut tally = LoopStats::default();
    info!(partition, "partition worker started");

    while let Some(msg) = source.next_message().await? {
        handle_message(&ctx, &msg, &mut tally).await;
        source.commit(msg.offset).await?;
    }

    info!(partition, handled = tally.handled, "partition stream ended");
    Ok(tally)
}

/// Start one independent worker task per source.
pub fn spawn_partitions<S>(ctx: &BridgeContext, sources: Vec<S>) -> Vec<JoinHandle<Result<LoopStats>>>
where
    S: MessageSource + 'static,
{
    sources
        .into_iter()
        .map(|source| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let partition = source.partition();
                let res = run_partition(ctx, source).await;
                if let Err(e) = &res {
                    error!(partition, error = %e, "partition worker stopped on source error");
                }
                res
            })
        })
        .collect()
}
