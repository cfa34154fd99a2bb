//! Scenario: installation session collisions and bounded connect retries.
//!
//! # Invariants under test
//!
//! 1. "session already open" is resolved by looking up the stale session,
//!    disconnecting it and connecting again.
//! 2. The collision consumes one attempt of the retry budget.
//! 3. Connect is never sent more than `max_attempts` times; exhaustion
//!    carries the last error and leaves the installation without a session.
//! 4. A rejected master code fails immediately and is never retried.

use std::sync::Arc;

use dhk_remote::{AlarmSession, Endpoint, RemoteGateway, RetryPolicy, SessionError, SessionPhase, Transport};
use dhk_schemas::wire::{MSG_BAD_PIN_CODE, MSG_SESSION_ALREADY_OPEN};
use dhk_schemas::GroupSet;
use dhk_testkit::{installation, Reply, ScriptedTransport, LOGIN, PASSWORD, STALE_SESSION, TTM_SESSION};
use serde_json::json;

async fn logged_in(transport: &Arc<ScriptedTransport>) -> RemoteGateway {
    let mut gw = RemoteGateway::new(LOGIN, PASSWORD, Arc::clone(transport) as Arc<dyn Transport>);
    assert!(gw.login().await.unwrap());
    gw
}

#[tokio::test]
async fn collision_closes_the_stale_session_then_reconnects() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_remote_groups(&[2]);
    t.push(Endpoint::Connect, Reply::connect_message(MSG_SESSION_ALREADY_OPEN));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let id = AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap();

    assert_eq!(id, TTM_SESSION);
    assert_eq!(inst.session_id(), Some(TTM_SESSION));
    assert_eq!(inst.phase(), SessionPhase::Active);
    assert_eq!(inst.active_groups(), &GroupSet::new([2]).unwrap());

    assert_eq!(
        t.endpoints(),
        vec![
            Endpoint::Login,
            Endpoint::Connect,
            Endpoint::LastSessionId,
            Endpoint::Disconnect,
            Endpoint::Connect,
        ]
    );
    assert_eq!(t.calls_to(Endpoint::LastSessionId)[0].body, json!({ "systemId": 7 }));
    assert_eq!(
        t.calls_to(Endpoint::Disconnect)[0].body,
        json!({ "systemId": "7", "ttmSessionId": STALE_SESSION })
    );
}

#[tokio::test]
async fn collision_consumes_one_attempt() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.push(Endpoint::Connect, Reply::connect_message(MSG_SESSION_ALREADY_OPEN));
    let gw = logged_in(&t).await;

    // Two attempts: collision + success fits.
    let mut inst = installation(7);
    let two = RetryPolicy::immediate(2);
    assert!(AlarmSession::new(&gw, &mut inst, &two).create_session().await.is_ok());

    // One attempt: the collision alone exhausts the budget.
    t.push(Endpoint::Connect, Reply::connect_message(MSG_SESSION_ALREADY_OPEN));
    let mut inst = installation(8);
    let one = RetryPolicy::immediate(1);
    let err = AlarmSession::new(&gw, &mut inst, &one)
        .create_session()
        .await
        .unwrap_err();
    match err {
        SessionError::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(inst.phase(), SessionPhase::NoSession);
}

#[tokio::test]
async fn endless_collisions_stop_at_the_bound() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::Connect, Reply::connect_message(MSG_SESSION_ALREADY_OPEN));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let err = AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ExhaustedRetries { attempts: 3, .. }));
    assert_eq!(t.count(Endpoint::Connect), 3);
    assert_eq!(t.count(Endpoint::Disconnect), 3);
    assert!(!inst.has_session());
}

#[tokio::test]
async fn missing_session_id_is_retried_then_exhausted_with_last_error() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::Connect, Reply::connect_message("transmitter.busy"));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let err = AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap_err();

    match err {
        SessionError::ExhaustedRetries {
            operation,
            attempts,
            last: Some(last),
        } => {
            assert_eq!(operation, "create_session");
            assert_eq!(attempts, 3);
            assert!(last.is_retryable());
        }
        other => panic!("expected exhaustion with a last error, got {other:?}"),
    }
    assert_eq!(t.count(Endpoint::Connect), 3);
    assert_eq!(t.count(Endpoint::Disconnect), 0);
}

#[tokio::test]
async fn undecodable_connect_then_success() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.push(Endpoint::Connect, Reply::Text(502, "<html>bad gateway</html>".to_string()));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap();

    assert_eq!(t.count(Endpoint::Connect), 2);
    assert!(inst.has_session());
}

#[tokio::test]
async fn bad_pin_code_is_a_configuration_error_on_first_try() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::Connect, Reply::connect_message(MSG_BAD_PIN_CODE));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let err = AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Configuration(_)));
    assert_eq!(t.count(Endpoint::Connect), 1);
    assert_eq!(inst.phase(), SessionPhase::NoSession);
}

#[tokio::test]
async fn transport_failure_is_not_retried() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::Connect, Reply::Unreachable("connection reset".to_string()));
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let err = AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(t.count(Endpoint::Connect), 1);
}

#[tokio::test]
async fn connect_body_carries_padded_master_code_and_bearer() {
    let t = Arc::new(ScriptedTransport::healthy());
    let gw = logged_in(&t).await;

    let mut inst = installation(7);
    inst.master_code = 42;
    inst.role = 1;
    let policy = RetryPolicy::immediate(3);
    AlarmSession::new(&gw, &mut inst, &policy)
        .create_session()
        .await
        .unwrap();

    let connect = &t.calls_to(Endpoint::Connect)[0];
    assert_eq!(
        connect.body,
        json!({
            "masterCode": "0042",
            "transmitterId": "TX0007",
            "systemId": 7,
            "role": 1,
        })
    );
    assert_eq!(connect.bearer.as_deref(), Some(dhk_testkit::BEARER));
}
