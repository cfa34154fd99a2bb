//! Axum router and all HTTP handlers for dhk-daemon.
//!
//! `main.rs` wraps `build_router` with CORS and request tracing. Reads serve
//! the published snapshots and never wait on an account gate; only the target
//! route runs a remote command.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use dhk_sync::TriggerNotice;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, InstallationsResponse, TargetRequest, TargetResponse,
        TriggerRequest, TriggerResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes for health, installation status, targets, triggers and the SSE stream.
///
/// Returned without layers; `main.rs` adds CORS and tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/installations", get(list_installations))
        .route("/v1/installations/:system_id", get(get_installation))
        .route("/v1/installations/:system_id/target", post(set_target))
        .route("/v1/triggers", post(post_trigger))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

fn not_found(system_id: i64) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "not_found",
            format!("system {system_id} is not configured"),
        )),
    )
        .into_response()
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
            uptime_secs: uptime_secs(),
            accounts: st.registry.accounts().len(),
            installations: st.registry.installations().len(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/installations[/:system_id]
// ---------------------------------------------------------------------------

pub(crate) async fn list_installations(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let installations = st
        .registry
        .installations()
        .iter()
        .map(|h| h.status())
        .collect();
    (StatusCode::OK, Json(InstallationsResponse { installations }))
}

pub(crate) async fn get_installation(
    State(st): State<Arc<AppState>>,
    Path(system_id): Path<i64>,
) -> Response {
    match st.registry.installation(system_id) {
        Some(h) => (StatusCode::OK, Json(h.status())).into_response(),
        None => not_found(system_id),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/installations/:system_id/target
// ---------------------------------------------------------------------------

/// Run the command path for the requested state and answer once it has
/// finished (including the account cooldown).
pub(crate) async fn set_target(
    State(st): State<Arc<AppState>>,
    Path(system_id): Path<i64>,
    Json(req): Json<TargetRequest>,
) -> Response {
    let Some(handle) = st.registry.installation(system_id) else {
        return not_found(system_id);
    };

    let request_id = Uuid::new_v4();
    info!(%request_id, system_id, target = %req.state, "target requested over http");
    match handle.request_state(req.state).await {
        Ok(security_state) => (
            StatusCode::OK,
            Json(TargetResponse {
                request_id,
                system_id,
                requested: req.state,
                security_state,
                status: handle.status(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(%request_id, system_id, error = %e, "target request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new(e.kind(), e.to_string())),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/triggers
// ---------------------------------------------------------------------------

/// Queue an alarm notice for every account that accepts trigger feeds. The
/// notice is matched on the scheduler's next trigger check.
pub(crate) async fn post_trigger(
    State(st): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Response {
    if !st.registry.has_trigger_feeds() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "no_trigger_feed",
                "no account accepts trigger notices (set trigger_feed: true)",
            )),
        )
            .into_response();
    }

    let notice = TriggerNotice::new(req.subject, req.received_at.unwrap_or_else(Utc::now));
    let queued = st.registry.queue_trigger(notice);
    info!(queued, "trigger notice queued");
    (StatusCode::ACCEPTED, Json(TriggerResponse { queued })).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
