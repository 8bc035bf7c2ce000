//! End-to-end CLI runs against the in-memory store (`--dry-run`); no database
//! or upstream store needed.

use std::io::Write;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const CONFIG_YAML: &str = r#"
stream:
  partitions: 1
reconcile:
  endpoint: "http://127.0.0.1:9"
  max_in_flight: 4
  request_timeout_secs: 1
"#;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[test]
fn dry_run_replay_applies_mutations_and_skips_bad_lines() {
    let config = write_temp(CONFIG_YAML);
    let capture = write_temp(concat!(
        r#"{"type":"documentChanged","collection":"orders","change":{"method":"upsert","oldValue":null,"newValue":{"id":"o1","status":"new"}}}"#,
        "\n",
        "this is not json\n",
        "\n",
        r#"{"type":"somethingNew"}"#,
        "\n",
        r#"{"type":"documentChanged","collection":"orders","change":{"method":"upsert","oldValue":{"id":"o1","status":"new"},"newValue":{"id":"o1","status":"shipped"}}}"#,
        "\n",
    ));

    let output = Command::cargo_bin("bridge")
        .unwrap()
        .args(["replay", "--dry-run", "--config"])
        .arg(config.path())
        .arg("--file")
        .arg(capture.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["store_backend"], "memory");
    assert_eq!(summary["loop"]["handled"], 5);
    assert_eq!(summary["loop"]["applied"], 2);
    assert_eq!(summary["loop"]["decode_failures"], 1);
    assert_eq!(summary["loop"]["unrecognized"], 1);
    assert_eq!(summary["loop"]["empty_payloads"], 1);
    assert_eq!(summary["dry_run_collections"]["orders"], 1);
}

#[test]
fn dry_run_replay_counts_failed_reconciliation() {
    let config = write_temp(CONFIG_YAML);
    // port 9 (discard) refuses connections; the reference fails, the replay does not
    let capture = write_temp(concat!(
        r#"{"type":"requeryRequired","txnId":7,"documents":[{"collectionName":"things","documentId":"x"}]}"#,
        "\n",
    ));

    let output = Command::cargo_bin("bridge")
        .unwrap()
        .args(["replay", "--dry-run", "--drain-secs", "5", "--config"])
        .arg(config.path())
        .arg("--file")
        .arg(capture.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["loop"]["reconcile_requests"], 1);
    assert_eq!(summary["stats"]["references_dispatched"], 1);
    assert_eq!(summary["stats"]["references_failed"], 1);
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let config = write_temp(CONFIG_YAML);
    Command::cargo_bin("bridge")
        .unwrap()
        .arg("config-hash")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="))
        .stdout(predicate::str::contains(r#""endpoint":"http://127.0.0.1:9""#));
}

#[test]
fn config_with_literal_secret_is_refused() {
    let config = write_temp(
        r#"
reconcile:
  endpoint: "http://127.0.0.1:9"
  api_token_env: "sk-live-abcdefghijkl"
"#,
    );
    Command::cargo_bin("bridge")
        .unwrap()
        .arg("config-hash")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
}
