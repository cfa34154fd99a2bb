//! Scenario: shape of the state commands sent for each requested group set.
//!
//! # Invariants under test
//!
//! 1. All four groups are armed with `systemState: "on"` and an empty list.
//! 2. A strict subset is armed with `systemState: "group"` and its ids.
//! 3. The empty set is always sent as `"off"`, never as an empty `"group"`.
//! 4. Non-200 answers are retried; an explicit refusal is an activation
//!    error and is not retried.
//! 5. Active groups are replaced from the accepted command.

use std::sync::Arc;

use dhk_remote::{AlarmSession, Endpoint, RemoteGateway, RetryPolicy, SessionError, Transport};
use dhk_schemas::{GroupSet, SecurityState};
use dhk_testkit::{installation, Reply, ScriptedTransport, LOGIN, PASSWORD, TTM_SESSION};
use serde_json::json;

async fn logged_in(transport: &Arc<ScriptedTransport>) -> RemoteGateway {
    let mut gw = RemoteGateway::new(LOGIN, PASSWORD, Arc::clone(transport) as Arc<dyn Transport>);
    assert!(gw.login().await.unwrap());
    gw
}

fn groups(ids: &[i64]) -> GroupSet {
    GroupSet::new(ids.iter().copied()).unwrap()
}

#[tokio::test]
async fn all_groups_use_on_with_an_empty_list() {
    let t = Arc::new(ScriptedTransport::healthy());
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&GroupSet::all())
        .await
        .unwrap();

    let cmd = &t.calls_to(Endpoint::StateCommand)[0];
    assert_eq!(
        cmd.body,
        json!({
            "systemState": "on",
            "group": [],
            "currentGroup": [],
            "nbGroups": "4",
            "ttmSessionId": TTM_SESSION,
        })
    );
    assert_eq!(inst.security_state(), SecurityState::AwayArmed);
}

#[tokio::test]
async fn subset_uses_group_with_its_ids() {
    let t = Arc::new(ScriptedTransport::healthy());
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&groups(&[3, 1]))
        .await
        .unwrap();

    let cmd = &t.calls_to(Endpoint::StateCommand)[0];
    assert_eq!(cmd.body["systemState"], "group");
    assert_eq!(cmd.body["group"], json!([1, 3]));
    assert_eq!(inst.active_groups(), &groups(&[1, 3]));
}

#[tokio::test]
async fn empty_set_is_sent_as_off() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_remote_groups(&[1, 2]);
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&GroupSet::empty())
        .await
        .unwrap();

    let cmds = t.calls_to(Endpoint::StateCommand);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].body["systemState"], "off");
    assert_eq!(cmds[0].body["group"], json!([]));
    assert!(cmds.iter().all(|c| c.body["systemState"] != "group"));
    assert!(inst.active_groups().is_empty());
    assert_eq!(inst.security_state(), SecurityState::Disarmed);
}

#[tokio::test]
async fn command_opens_a_session_when_none_is_held() {
    let t = Arc::new(ScriptedTransport::healthy());
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .deactivate_alarm()
        .await
        .unwrap();

    assert_eq!(
        t.endpoints(),
        vec![Endpoint::Login, Endpoint::Connect, Endpoint::StateCommand]
    );
}

#[tokio::test]
async fn non_200_is_retried_until_accepted() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.push(Endpoint::StateCommand, Reply::Json(503, json!({})));
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&groups(&[2]))
        .await
        .unwrap();

    assert_eq!(t.count(Endpoint::StateCommand), 2);
    assert_eq!(inst.active_groups(), &groups(&[2]));
}

#[tokio::test]
async fn non_200_forever_exhausts_the_bound() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::StateCommand, Reply::Json(500, json!({})));
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    let err = AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&groups(&[2]))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ExhaustedRetries { attempts: 3, .. }));
    assert_eq!(t.count(Endpoint::StateCommand), 3);
}

#[tokio::test]
async fn refused_command_is_an_activation_error() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_remote_groups(&[1]);
    t.set_default(Endpoint::StateCommand, Reply::command_status("CMD_KO"));
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    let mut session = AlarmSession::new(&gw, &mut inst, &policy);
    let err = session
        .send_activation_command(&GroupSet::all())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Activation(_)));
    assert_eq!(t.count(Endpoint::StateCommand), 1);
    // Groups stay as last seen on connect.
    assert_eq!(session.installation().active_groups(), &groups(&[1]));
}

#[tokio::test]
async fn accepted_command_without_groups_assumes_the_request() {
    let t = Arc::new(ScriptedTransport::healthy());
    t.set_default(Endpoint::StateCommand, Reply::command_status("CMD_OK"));
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);

    AlarmSession::new(&gw, &mut inst, &policy)
        .send_activation_command(&groups(&[1, 2]))
        .await
        .unwrap();

    assert_eq!(inst.active_groups(), &groups(&[1, 2]));
}

#[tokio::test]
async fn status_refresh_replaces_groups_and_retries_missing_list() {
    let t = Arc::new(ScriptedTransport::healthy());
    let gw = logged_in(&t).await;
    let mut inst = installation(7);
    let policy = RetryPolicy::immediate(3);
    let mut session = AlarmSession::new(&gw, &mut inst, &policy);

    // No session yet: opening one is the refresh.
    t.set_remote_groups(&[1, 2]);
    session.update_status().await.unwrap();
    assert_eq!(t.count(Endpoint::SystemState), 0);
    assert_eq!(session.installation().active_groups(), &groups(&[1, 2]));

    t.set_remote_groups(&[4]);
    t.push(Endpoint::SystemState, Reply::Json(200, json!({})));
    session.update_status().await.unwrap();
    assert_eq!(t.count(Endpoint::SystemState), 2);
    assert_eq!(session.installation().active_groups(), &groups(&[4]));
    assert_eq!(
        t.calls_to(Endpoint::SystemState)[0].body,
        json!({ "centralId": "CU0007", "ttmSessionId": TTM_SESSION })
    );
}
