//! In-process scenario tests for dhk-daemon HTTP endpoints.
//!
//! These tests build the Axum router **without** binding a TCP socket and
//! drive it via `tower::ServiceExt::oneshot`. The vendor cloud is replaced
//! by the scripted transport from dhk-testkit.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use dhk_config::BridgeConfig;
use dhk_daemon::{routes, state};
use dhk_remote::{Endpoint, Transport};
use dhk_sync::AccountRegistry;
use dhk_testkit::{systems_listing, Reply, ScriptedTransport};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(trigger_feed: bool) -> BridgeConfig {
    let doc = json!({
        "scheduler": {
            "cooldown_secs": 0,
            "retry_delay_secs": 0,
            "retry_jitter_ms": 0,
        },
        "systems": [
            {
                "login": "owner@example.com",
                "password": "pw",
                "system_id": 7,
                "transmitter_id": "AB07",
                "central_id": "CD07",
                "master_code": 1234,
                "name": "Maison",
                "trigger_feed": trigger_feed,
            },
            {
                "login": "owner@example.com",
                "password": "pw",
                "system_id": 8,
                "transmitter_id": "AB08",
                "central_id": "CD08",
                "master_code": 1234,
                "name": "Garage",
            },
        ],
    });
    BridgeConfig::from_json(&doc).unwrap()
}

fn make_state(transport: &Arc<ScriptedTransport>, trigger_feed: bool) -> Arc<state::AppState> {
    let registry = AccountRegistry::from_config(
        &config(trigger_feed),
        Arc::clone(transport) as Arc<dyn Transport>,
    );
    Arc::new(state::AppState::new(Arc::new(registry)))
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

/// Parse body bytes as a `serde_json::Value`.
fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_registry_size() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, body) = call(router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "dhk-daemon");
    assert_eq!(json["accounts"], 1);
    assert_eq!(json["installations"], 2);
    assert!(t.calls().is_empty());
}

// ---------------------------------------------------------------------------
// GET /v1/installations[/:system_id]
// ---------------------------------------------------------------------------

#[tokio::test]
async fn installations_serve_published_snapshots() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_remote_groups(&[2]);
    let st = make_state(&t, false);
    st.registry.accounts()[0].poll_cycle().await.unwrap();
    let router = routes::build_router(Arc::clone(&st));

    let (status, body) = call(router.clone(), get("/v1/installations")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    let list = json["installations"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["system_id"], 7);
    assert_eq!(list[0]["security_state"], "night_armed");
    assert_eq!(list[0]["serial_number"], "CD07");

    let calls_before = t.calls().len();
    let (status, body) = call(router, get("/v1/installations/8")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["name"], "Garage");
    assert_eq!(json["active_groups"], json!([2]));
    assert_eq!(json["status_fault"], false);
    // Reads never reach the remote.
    assert_eq!(t.calls().len(), calls_before);
}

#[tokio::test]
async fn unknown_installation_is_404() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, body) = call(router.clone(), get("/v1/installations/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["kind"], "not_found");

    let (status, _) = call(router, get("/v1/installations/not-a-number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// POST /v1/installations/:system_id/target
// ---------------------------------------------------------------------------

#[tokio::test]
async fn target_runs_the_command_path() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, body) = call(
        router,
        post_json("/v1/installations/7/target", json!({ "state": "away_armed" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["system_id"], 7);
    assert!(json["request_id"].as_str().is_some());
    assert_eq!(json["requested"], "away_armed");
    assert_eq!(json["security_state"], "away_armed");
    assert_eq!(json["status"]["target_state"], "away_armed");

    let cmd = &t.calls_to(Endpoint::StateCommand)[0];
    assert_eq!(cmd.body["systemState"], "group");
    assert_eq!(cmd.body["group"], json!([1, 2]));
    assert_eq!(t.count(Endpoint::Logout), 1);
}

#[tokio::test]
async fn remote_failure_is_502_with_the_error_kind() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::StateCommand, Reply::command_status("CMD_KO"));
    let st = make_state(&t, false);
    let router = routes::build_router(Arc::clone(&st));

    let (status, body) = call(
        router,
        post_json("/v1/installations/7/target", json!({ "state": "disarmed" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(parse_json(body)["kind"], "activation");
    assert!(st.registry.installation(7).unwrap().status_fault());
}

#[tokio::test]
async fn target_on_unknown_installation_is_404_without_remote_calls() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, _) = call(
        router,
        post_json("/v1/installations/99/target", json!({ "state": "disarmed" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(t.calls().is_empty());
}

#[tokio::test]
async fn triggered_is_not_a_requestable_target() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, _) = call(
        router,
        post_json("/v1/installations/7/target", json!({ "state": "triggered" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(t.calls().is_empty());
}

// ---------------------------------------------------------------------------
// POST /v1/triggers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_notice_is_applied_on_the_next_check() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::Systems, systems_listing(&[(7, "MAISON"), (8, "GARAGE")]));
    t.set_remote_groups(&[1]);
    let st = make_state(&t, true);
    let account = Arc::clone(&st.registry.accounts()[0]);
    account.initialize().await.unwrap();
    account.poll_cycle().await.unwrap();
    let router = routes::build_router(Arc::clone(&st));

    let (status, body) = call(
        router.clone(),
        post_json("/v1/triggers", json!({ "subject": "Alerte GARAGE : Alarme" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(parse_json(body)["queued"], 1);

    assert_eq!(account.check_triggers().await.unwrap(), 1);

    let (_, body) = call(router, get("/v1/installations/8")).await;
    let json = parse_json(body);
    assert_eq!(json["security_state"], "triggered");
    assert_eq!(json["triggered"], true);
}

#[tokio::test]
async fn trigger_without_a_feed_is_409() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let (status, body) = call(
        router,
        post_json("/v1/triggers", json!({ "subject": "MAISON : Alarme" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["kind"], "no_trigger_feed");
}

// ---------------------------------------------------------------------------
// GET /v1/stream and the event relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_is_server_sent_events() {
    let t = Arc::new(ScriptedTransport::healthy());
    let router = routes::build_router(make_state(&t, false));

    let resp = router.oneshot(get("/v1/stream")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(ct.starts_with("text/event-stream"), "content-type was {ct}");
}

#[tokio::test]
async fn sync_events_are_relayed_to_the_bus() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_remote_groups(&[1]);
    let st = make_state(&t, false);
    let mut rx = st.bus.subscribe();
    state::spawn_event_relay(&st);

    st.registry.accounts()[0].poll_cycle().await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event relayed")
        .unwrap();
    assert_eq!(msg.event_name(), "status");
    match msg {
        state::BusMsg::Status(s) => assert_eq!(s.system_id, 7),
        other => panic!("unexpected message {other:?}"),
    }
}
