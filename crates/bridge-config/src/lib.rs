//! Layered YAML configuration for the bridge.
//!
//! Documents are merged in order (later layers override earlier ones),
//! converted to JSON, canonicalised and hashed. The hash identifies the exact
//! effective configuration a process ran with and is logged at startup.
//!
//! YAML holds env var NAMES for credentials, never values. Leaf strings that
//! look like credentials are rejected with `CONFIG_SECRET_DETECTED`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_find_token, resolve_secrets, ResolvedSecrets};
pub use settings::{BridgeSettings, DaemonSettings, ReconcileSettings, StreamSettings, TargetSettings};

/// Prefixes of well-known credential formats.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
    "postgres://",
    "postgresql://",
];

/// Exact leaf pointers read by [`BridgeSettings::from_config_json`]. Listed
/// one by one so a misspelled key inside a known section is still reported.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/stream/partitions",
    "/stream/queue_depth",
    "/target/database_url_env",
    "/target/max_connections",
    "/reconcile/endpoint",
    "/reconcile/api_token_env",
    "/reconcile/max_in_flight",
    "/reconcile/request_timeout_secs",
    "/daemon/addr",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let raw = fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        // an empty document parses as null; treat it as "no overrides"
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with object keys sorted at every level.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Leaf pointers not covered by [`CONSUMED_POINTERS`] (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Report config leaves nothing reads. Typos in optional keys otherwise fall
/// back to defaults silently.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        // an empty section (`daemon: {}`) is a leaf above a consumed key
        .filter(|leaf| {
            !CONSUMED_POINTERS
                .iter()
                .any(|p| is_prefix_pointer(p, leaf) || is_prefix_pointer(leaf, p))
        })
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };
    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }
    Ok(report)
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push(prefix.to_string());
            }
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let merged = deep_merge(
            json!({"reconcile": {"endpoint": "http://a", "max_in_flight": 4}}),
            json!({"reconcile": {"endpoint": "http://b"}}),
        );
        assert_eq!(merged, json!({"reconcile": {"endpoint": "http://b", "max_in_flight": 4}}));
    }

    #[test]
    fn pointer_prefix_respects_segment_boundary() {
        assert!(is_prefix_pointer("/stream", "/stream/partitions"));
        assert!(is_prefix_pointer("/stream", "/stream"));
        assert!(!is_prefix_pointer("/stream", "/streams/x"));
    }

    #[test]
    fn unused_keys_are_reported() {
        let cfg = json!({"stream": {"partitions": 2}, "stram": {"partitions": 3}});
        let report = report_unused_keys(&cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(report.unused_leaf_pointers, vec!["/stram/partitions".to_string()]);
        assert!(report_unused_keys(&cfg, UnusedKeyPolicy::Fail).is_err());
    }

    #[test]
    fn typo_inside_known_section_is_reported() {
        let cfg = json!({
            "reconcile": {"endpoint": "http://find", "max_in_flgiht": 0},
            "daemon": {}
        });
        let report = report_unused_keys(&cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(
            report.unused_leaf_pointers,
            vec!["/reconcile/max_in_flgiht".to_string()]
        );
    }

    #[test]
    fn shipped_config_reads_every_key() {
        let raw = include_str!("../../../config/bridge.yaml");
        let loaded = load_layered_yaml_from_strings(&[raw]).unwrap();
        let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn short_strings_are_never_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("postgres://u:p@h/db"));
    }
}
