//! Shared runtime state for bridge-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Partition workers are
//! started here and fed through their [`PartitionSender`]s. On shutdown the
//! senders are dropped so each worker drains its queue and ends.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use bridge_runtime::{spawn_partitions, BridgeContext, ChannelSource, LoopStats, PartitionSender, StatsSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Stats(StatsSnapshot),
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Result of looking up a partition queue for an enqueue.
pub enum PartitionLookup {
    Open(PartitionSender),
    Unknown,
    /// The partition exists but its queue was closed for shutdown.
    Closed,
}

pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub config_hash: String,
    pub ctx: BridgeContext,
    /// Every configured partition number, open or not.
    pub partition_ids: Vec<u32>,
    /// Producer half of every open partition queue. Emptied by
    /// [`AppState::close_partitions`].
    senders: RwLock<BTreeMap<u32, PartitionSender>>,
}

impl AppState {
    pub fn new(ctx: BridgeContext, senders: Vec<PartitionSender>, config_hash: impl Into<String>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let senders: BTreeMap<u32, PartitionSender> = senders.into_iter().map(|s| (s.partition(), s)).collect();
        Self {
            bus,
            build: BuildInfo {
                service: "bridge-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config_hash: config_hash.into(),
            ctx,
            partition_ids: senders.keys().copied().collect(),
            senders: RwLock::new(senders),
        }
    }

    pub fn sender(&self, partition: u32) -> PartitionLookup {
        if !self.partition_ids.contains(&partition) {
            return PartitionLookup::Unknown;
        }
        let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());
        match senders.get(&partition) {
            Some(s) => PartitionLookup::Open(s.clone()),
            None => PartitionLookup::Closed,
        }
    }

    /// Drop every partition sender so the workers see end-of-stream once
    /// their queues are empty. Later enqueues are refused.
    pub fn close_partitions(&self) {
        let mut senders = self.senders.write().unwrap_or_else(|e| e.into_inner());
        let closed = senders.len();
        senders.clear();
        info!(closed, "partition queues closed");
    }
}

/// Create `count` partition queues (numbered from 0) and spawn one worker per
/// queue.
pub fn start_partition_workers(
    ctx: &BridgeContext,
    count: u32,
    queue_depth: usize,
) -> (Vec<PartitionSender>, Vec<JoinHandle<Result<LoopStats>>>) {
    let (senders, sources): (Vec<_>, Vec<_>) =
        (0..count).map(|p| ChannelSource::new(p, queue_depth)).unzip();
    let handles = spawn_partitions(ctx, sources);
    (senders, handles)
}

/// Wait for partition workers to finish draining, sharing one `grace`
/// deadline. Workers still running at the deadline are aborted. Returns the
/// final tally of each worker in order, `None` where it failed or was aborted.
pub async fn drain_partition_workers(
    workers: Vec<JoinHandle<Result<LoopStats>>>,
    grace: Duration,
) -> Vec<Option<LoopStats>> {
    let deadline = tokio::time::Instant::now() + grace;
    let mut tallies = Vec::with_capacity(workers.len());
    for (partition, mut handle) in workers.into_iter().enumerate() {
        let tally = match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(tally))) => {
                info!(partition, ?tally, "partition worker drained");
                Some(tally)
            }
            Ok(Ok(Err(e))) => {
                warn!(partition, error = %e, "partition worker ended with error");
                None
            }
            Ok(Err(e)) => {
                warn!(partition, error = %e, "partition worker task failed");
                None
            }
            Err(_) => {
                handle.abort();
                warn!(partition, "partition worker did not drain in time; aborted");
                None
            }
        };
        tallies.push(tally);
    }
    tallies
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_secs()
}

/// Broadcast a heartbeat plus a stats snapshot every `interval`.
pub fn spawn_stats_ticker(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = state.bus.send(BusMsg::Heartbeat { ts_millis: ts });
            let _ = state.bus.send(BusMsg::Stats(state.ctx.stats.snapshot()));
        }
    });
}
