//! Axum router and HTTP handlers for bridge-daemon.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers afterwards so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::{
    api_types::{EnqueueResponse, ErrorResponse, HealthResponse, StatusResponse},
    state::{uptime_secs, AppState, BusMsg, PartitionLookup},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/partitions/:partition/messages", post(enqueue_message))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.ctx.stats.snapshot();
    let _ = st.bus.send(BusMsg::Stats(snap.clone()));
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
            store_backend: st.ctx.store.backend_name().to_string(),
            partitions: st.partition_ids.clone(),
            stats: snap,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/partitions/:partition/messages
// ---------------------------------------------------------------------------

/// Queue one raw payload on a partition. The body is passed through
/// untouched; an empty body is delivered as an empty message.
pub(crate) async fn enqueue_message(
    State(st): State<Arc<AppState>>,
    Path(partition): Path<u32>,
    body: Bytes,
) -> Response {
    let sender = match st.sender(partition) {
        PartitionLookup::Open(sender) => sender,
        PartitionLookup::Unknown => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("unknown partition {partition}"),
                }),
            )
                .into_response();
        }
        PartitionLookup::Closed => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("partition {partition} is closed for shutdown"),
                }),
            )
                .into_response();
        }
    };

    let payload = (!body.is_empty()).then(|| body.to_vec());
    match sender.send(payload).await {
        Ok(offset) => {
            debug!(partition, offset, "message queued");
            (StatusCode::ACCEPTED, Json(EnqueueResponse { partition, offset })).into_response()
        }
        Err(e) => {
            warn!(partition, error = %e, "enqueue refused");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = broadcast_to_sse(st.bus.subscribe());
    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        // lagged receivers just skip ahead
        let m = msg.ok()?;
        let event_name = match &m {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Stats(_) => "stats",
        };
        let data = serde_json::to_string(&m).ok()?;
        Some(Ok(Event::default().event(event_name).data(data)))
    })
}
