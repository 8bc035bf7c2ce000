//! Typed view over the merged config JSON.
//!
//! ```yaml
//! stream:
//!   partitions: 4          # one worker per partition
//!   queue_depth: 1024      # bounded per-partition queue (daemon push)
//! target:
//!   database_url_env: BRIDGE_DATABASE_URL
//!   max_connections: 5
//! reconcile:
//!   endpoint: "https://store.example.com"
//!   api_token_env: BRIDGE_FIND_API_TOKEN   # optional
//!   max_in_flight: 16      # 0 = unbounded
//!   request_timeout_secs: 30
//! daemon:
//!   addr: "127.0.0.1:8899"
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_PARTITIONS: u32 = 1;
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_DATABASE_URL_ENV: &str = "BRIDGE_DATABASE_URL";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSettings {
    pub partitions: u32,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSettings {
    /// Name of the env var holding the Postgres URL.
    pub database_url_env: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSettings {
    /// Base URL of the upstream store; `/api/v3/store/find` is appended.
    pub endpoint: String,
    /// Name of the env var holding the bearer token, if the store needs one.
    pub api_token_env: Option<String>,
    pub max_in_flight: usize,
    /// `0` disables the per-request timeout.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonSettings {
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeSettings {
    pub stream: StreamSettings,
    pub target: TargetSettings,
    pub reconcile: ReconcileSettings,
    pub daemon: DaemonSettings,
}

impl BridgeSettings {
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let partitions = u64_at(cfg, "/stream/partitions")?.unwrap_or(DEFAULT_PARTITIONS as u64);
        if partitions == 0 || partitions > u32::MAX as u64 {
            bail!("CONFIG_INVALID /stream/partitions: must be between 1 and {}", u32::MAX);
        }
        let queue_depth = u64_at(cfg, "/stream/queue_depth")?.unwrap_or(DEFAULT_QUEUE_DEPTH as u64);
        if queue_depth == 0 {
            bail!("CONFIG_INVALID /stream/queue_depth: must be at least 1");
        }

        let database_url_env =
            str_at(cfg, "/target/database_url_env")?.unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string());
        let max_connections =
            u64_at(cfg, "/target/max_connections")?.unwrap_or(DEFAULT_MAX_CONNECTIONS as u64);
        if max_connections == 0 {
            bail!("CONFIG_INVALID /target/max_connections: must be at least 1");
        }

        let endpoint = str_at(cfg, "/reconcile/endpoint")?
            .context("CONFIG_MISSING /reconcile/endpoint: upstream store base URL is required")?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            bail!("CONFIG_INVALID /reconcile/endpoint: expected an http(s) URL");
        }

        Ok(Self {
            stream: StreamSettings {
                partitions: partitions as u32,
                queue_depth: queue_depth as usize,
            },
            target: TargetSettings {
                database_url_env,
                max_connections: max_connections.min(u32::MAX as u64) as u32,
            },
            reconcile: ReconcileSettings {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_token_env: str_at(cfg, "/reconcile/api_token_env")?,
                max_in_flight: u64_at(cfg, "/reconcile/max_in_flight")?
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
                request_timeout_secs: u64_at(cfg, "/reconcile/request_timeout_secs")?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            daemon: DaemonSettings {
                addr: str_at(cfg, "/daemon/addr")?.unwrap_or_else(|| DEFAULT_DAEMON_ADDR.to_string()),
            },
        })
    }
}

/// Absent or null -> `None`; present but not a non-negative integer -> error.
fn u64_at(cfg: &Value, pointer: &str) -> Result<Option<u64>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID {pointer}: expected a non-negative integer")),
    }
}

/// Absent, null or blank -> `None`; present but not a string -> error.
fn str_at(cfg: &Value, pointer: &str) -> Result<Option<String>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => bail!("CONFIG_INVALID {pointer}: expected a string"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_everything_but_endpoint() {
        let s = BridgeSettings::from_config_json(&json!({
            "reconcile": {"endpoint": "http://localhost:4000/"}
        }))
        .unwrap();
        assert_eq!(s.stream.partitions, DEFAULT_PARTITIONS);
        assert_eq!(s.stream.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(s.target.database_url_env, DEFAULT_DATABASE_URL_ENV);
        assert_eq!(s.reconcile.endpoint, "http://localhost:4000");
        assert_eq!(s.reconcile.api_token_env, None);
        assert_eq!(s.reconcile.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(s.daemon.addr, DEFAULT_DAEMON_ADDR);
    }

    #[test]
    fn missing_endpoint_is_an_error() {
        let err = BridgeSettings::from_config_json(&json!({})).unwrap_err();
        assert!(err.to_string().contains("/reconcile/endpoint"));
    }

    #[test]
    fn zero_partitions_rejected() {
        let err = BridgeSettings::from_config_json(&json!({
            "stream": {"partitions": 0},
            "reconcile": {"endpoint": "http://x"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("/stream/partitions"));
    }

    #[test]
    fn wrong_types_are_rejected_not_defaulted() {
        let err = BridgeSettings::from_config_json(&json!({
            "stream": {"partitions": "four"},
            "reconcile": {"endpoint": "http://x"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("expected a non-negative integer"));
    }

    #[test]
    fn zero_max_in_flight_means_unbounded() {
        let s = BridgeSettings::from_config_json(&json!({
            "reconcile": {"endpoint": "https://x", "max_in_flight": 0}
        }))
        .unwrap();
        assert_eq!(s.reconcile.max_in_flight, 0);
    }
}
