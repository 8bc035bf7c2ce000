//! `bridge replay`: push a JSON-lines capture through one partition worker.
//!
//! Each line is one raw message payload. The replay is sequential and ends
//! when the file does; in-flight reconciliation is then given `drain` time to
//! finish before the summary is printed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use bridge_config::{resolve_find_token, resolve_secrets, BridgeSettings};
use bridge_db::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
use bridge_reconcile::HttpFindClient;
use bridge_runtime::{run_partition, BridgeContext, JsonLinesSource, LoopStats, StatsSnapshot};
use serde::Serialize;
use tracing::{info, warn};

pub struct ReplayArgs {
    pub config_paths: Vec<String>,
    pub file: String,
    pub partition: u32,
    /// Apply to an in-memory store instead of Postgres.
    pub dry_run: bool,
    pub drain: Duration,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub config_hash: String,
    pub store_backend: String,
    #[serde(rename = "loop")]
    pub loop_stats: LoopStats,
    pub stats: StatsSnapshot,
    /// Documents held by the in-memory store per collection (dry runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run_collections: Option<std::collections::BTreeMap<String, usize>>,
}

pub async fn run_replay(args: ReplayArgs) -> Result<ReplaySummary> {
    let loaded = super::load_config(&args.config_paths)?;
    let settings = BridgeSettings::from_config_json(&loaded.config_json)?;

    let memory = args.dry_run.then(|| Arc::new(MemoryDocumentStore::new()));
    let (store, token): (Arc<dyn DocumentStore>, Option<String>) = match &memory {
        Some(m) => (m.clone() as Arc<dyn DocumentStore>, resolve_find_token(&settings)?),
        None => {
            let secrets = resolve_secrets(&settings)?;
            let pool = bridge_db::connect(&secrets.database_url, settings.target.max_connections).await?;
            bridge_db::migrate(&pool).await?;
            (Arc::new(PgDocumentStore::new(pool)) as Arc<dyn DocumentStore>, secrets.find_api_token)
        }
    };

    let timeout = (settings.reconcile.request_timeout_secs > 0)
        .then(|| Duration::from_secs(settings.reconcile.request_timeout_secs));
    let finder = HttpFindClient::with_options(settings.reconcile.endpoint.clone(), token, timeout)?;
    let ctx = BridgeContext::new(Arc::clone(&store), Arc::new(finder), settings.reconcile.max_in_flight);

    info!(file = %args.file, partition = args.partition, backend = store.backend_name(), "replay starting");
    let source = JsonLinesSource::open(&args.file, args.partition).await?;
    let loop_stats = run_partition(ctx.clone(), source).await?;

    let stats = drain_reconciliation(&ctx, args.drain).await;

    let dry_run_collections = match memory {
        Some(m) => Some(m.collection_counts().await),
        None => None,
    };

    Ok(ReplaySummary {
        config_hash: loaded.config_hash,
        store_backend: store.backend_name().to_string(),
        loop_stats,
        stats,
        dry_run_collections,
    })
}

/// Wait until every dispatched reference has an outcome, or `limit` passes.
async fn drain_reconciliation(ctx: &BridgeContext, limit: Duration) -> StatsSnapshot {
    let deadline = Instant::now() + limit;
    loop {
        let snap = ctx.stats.snapshot();
        let pending = snap.pending_references();
        if pending == 0 {
            return snap;
        }
        if Instant::now() >= deadline {
            warn!(pending, "reconciliation still in flight at exit");
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
