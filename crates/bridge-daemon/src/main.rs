//! bridge-daemon entry point.
//!
//! Usage: `bridge-daemon [config.yaml ...]` (layers merged in order; defaults
//! to `config/bridge.yaml`). `BRIDGE_DAEMON_ADDR` overrides `daemon.addr`.
//!
//! Boot order: config -> secrets -> Postgres (migrated) -> find client ->
//! partition workers -> HTTP server. On Ctrl-C the server stops accepting,
//! partition queues close and workers drain what was already accepted.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use bridge_config::{load_layered_yaml, report_unused_keys, resolve_secrets, BridgeSettings, UnusedKeyPolicy};
use bridge_daemon::{routes, state};
use bridge_db::PgDocumentStore;
use bridge_reconcile::HttpFindClient;
use bridge_runtime::BridgeContext;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_PATH: &str = "config/bridge.yaml";
/// How long queued messages may take to drain after shutdown is requested.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    let paths: Vec<&str> = if paths.is_empty() {
        vec![DEFAULT_CONFIG_PATH]
    } else {
        paths.iter().map(String::as_str).collect()
    };

    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config contains keys nothing reads");
    }
    let settings = BridgeSettings::from_config_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&settings)?;
    info!(config_hash = %loaded.config_hash, ?settings, ?secrets, "config loaded");

    let pool = bridge_db::connect(&secrets.database_url, settings.target.max_connections).await?;
    bridge_db::migrate(&pool).await?;
    let store = Arc::new(PgDocumentStore::new(pool));

    let timeout = (settings.reconcile.request_timeout_secs > 0)
        .then(|| Duration::from_secs(settings.reconcile.request_timeout_secs));
    let finder = HttpFindClient::with_options(
        settings.reconcile.endpoint.clone(),
        secrets.find_api_token.clone(),
        timeout,
    )?;

    let ctx = BridgeContext::new(store, Arc::new(finder), settings.reconcile.max_in_flight);
    let (senders, workers) =
        state::start_partition_workers(&ctx, settings.stream.partitions, settings.stream.queue_depth);
    info!(partitions = settings.stream.partitions, "partition workers started");

    let shared = Arc::new(state::AppState::new(ctx, senders, loaded.config_hash));
    state::spawn_stats_ticker(Arc::clone(&shared), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(a) => a,
        None => settings
            .daemon
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid daemon.addr: {}", settings.daemon.addr))?,
    };
    info!("bridge-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    shared.close_partitions();
    let tallies = state::drain_partition_workers(workers, DRAIN_GRACE).await;
    let drained = tallies.iter().filter(|t| t.is_some()).count();
    info!(drained, partitions = tallies.len(), "partition workers stopped");

    info!(stats = ?shared.ctx.stats.snapshot(), "bridge-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("BRIDGE_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
