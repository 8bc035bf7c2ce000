//! bridge-runtime
//!
//! Event routing, mutation application and the per-partition ingestion loop.
//!
//! Data flow:
//! raw message -> decoder -> router -> { mutation applier | reconciler }
//!
//! All collaborators arrive through one explicit [`BridgeContext`]; there is
//! no global state.

pub mod applier;
pub mod context;
pub mod ingest;
pub mod router;
pub mod source;
pub mod stats;

pub use applier::{apply_change, WriteOutcome};
pub use context::BridgeContext;
pub use ingest::{handle_message, run_partition, spawn_partitions, LoopStats};
pub use router::{route_event, Routed};
pub use source::{ChannelSource, InboundMessage, JsonLinesSource, MessageSource, PartitionSender};
pub use stats::{BridgeStats, StatsSnapshot};
