//! Request and response types for the daemon HTTP endpoints.

use bridge_runtime::StatsSnapshot;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    /// SHA-256 of the effective configuration the daemon booted with.
    pub config_hash: String,
    pub store_backend: String,
    pub partitions: Vec<u32>,
    pub stats: StatsSnapshot,
}

// ---------------------------------------------------------------------------
// /v1/partitions/:partition/messages
// ---------------------------------------------------------------------------

/// `202 Accepted`: the payload is queued, not yet applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub partition: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
