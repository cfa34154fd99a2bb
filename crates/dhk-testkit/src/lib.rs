//! dhk-testkit
//!
//! In-process stand-in for the vendor cloud plus fixture builders for the
//! scenario tests under `tests/`.
//!
//! [`ScriptedTransport`] answers each endpoint from a queue of one-shot
//! replies, then from a per-endpoint default. It keeps a tiny model of the
//! alarm's armed groups so connect and state-command replies stay coherent,
//! and records every call in order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dhk_reconcile::ArmingProfile;
use dhk_remote::{Endpoint, Installation, RawResponse, RetryPolicy, SessionError, Transport};
use dhk_sync::{Account, AccountRegistry, AccountSettings, Credential, QueuedTriggerSource, SyncEvent, TriggerFeed};
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const LOGIN: &str = "owner@example.com";
pub const PASSWORD: &str = "correct horse";
pub const BEARER: &str = "bearer-1";
pub const TTM_SESSION: &str = "ttm-1";
pub const STALE_SESSION: &str = "stale-1";

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, String),
    /// Failure below HTTP.
    Unreachable(String),
    /// Connect accepted with this session id and the modelled groups.
    OpenSession(String),
    /// getSystemState answered with the modelled groups.
    CurrentGroups,
    /// stateCommand accepted; the requested groups become the modelled groups.
    EchoCommand,
}

impl Reply {
    pub fn ok_status() -> Self {
        Reply::Json(200, json!({ "status": "OK" }))
    }

    pub fn connect_message(message: &str) -> Self {
        Reply::Json(200, json!({ "message": message }))
    }

    pub fn command_status(status: &str) -> Self {
        Reply::Json(200, json!({ "commandStatus": status }))
    }
}

/// One request seen by the transport.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub seq: usize,
    pub endpoint: Endpoint,
    pub bearer: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct Script {
    queued: HashMap<Endpoint, VecDeque<Reply>>,
    defaults: HashMap<Endpoint, Reply>,
    remote_groups: Vec<i64>,
    calls: Vec<RecordedCall>,
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    latency: Duration,
}

impl ScriptedTransport {
    /// Nothing scripted: every call answers 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cooperative remote: login, logout, connect, disconnect, status and
    /// commands all succeed.
    pub fn healthy() -> Self {
        let t = Self::new();
        t.set_default(Endpoint::Login, Reply::Json(200, json!({ "sessionId": BEARER })));
        t.set_default(Endpoint::Logout, Reply::ok_status());
        t.set_default(Endpoint::Connect, Reply::OpenSession(TTM_SESSION.to_string()));
        t.set_default(Endpoint::Disconnect, Reply::ok_status());
        t.set_default(
            Endpoint::LastSessionId,
            Reply::Text(200, format!("\"{STALE_SESSION}\"")),
        );
        t.set_default(Endpoint::SystemState, Reply::CurrentGroups);
        t.set_default(Endpoint::StateCommand, Reply::EchoCommand);
        t.set_default(
            Endpoint::Systems,
            Reply::Json(200, json!({ "diagralId": 4242, "systems": [] })),
        );
        t
    }

    /// Delay every reply, widening the window for interleaving.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer the next call to `endpoint` with `reply`, ahead of the default.
    pub fn push(&self, endpoint: Endpoint, reply: Reply) {
        self.lock()
            .queued
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    pub fn set_default(&self, endpoint: Endpoint, reply: Reply) {
        self.lock().defaults.insert(endpoint, reply);
    }

    pub fn set_remote_groups(&self, groups: &[i64]) {
        self.lock().remote_groups = groups.to_vec();
    }

    pub fn remote_groups(&self) -> Vec<i64> {
        self.lock().remote_groups.clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    /// Endpoints in call order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lock().calls.iter().map(|c| c.endpoint).collect()
    }

    fn answer(&self, endpoint: Endpoint, bearer: Option<&str>, body: Value) -> Reply {
        let mut script = self.lock();
        let seq = script.calls.len();
        script.calls.push(RecordedCall {
            seq,
            endpoint,
            bearer: bearer.map(str::to_owned),
            body: body.clone(),
        });

        let queued = script.queued.get_mut(&endpoint).and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(r) => r,
            None => script
                .defaults
                .get(&endpoint)
                .cloned()
                .unwrap_or_else(|| Reply::Json(404, json!({ "message": "unscripted" }))),
        };

        match reply {
            Reply::OpenSession(id) => Reply::Json(
                200,
                json!({ "ttmSessionId": id, "groups": script.remote_groups }),
            ),
            Reply::CurrentGroups => Reply::Json(200, json!({ "groups": script.remote_groups })),
            Reply::EchoCommand => {
                script.remote_groups = match body["systemState"].as_str() {
                    Some("on") => vec![1, 2, 3, 4],
                    Some("group") => body["group"]
                        .as_array()
                        .map(|a| a.iter().filter_map(Value::as_i64).collect())
                        .unwrap_or_default(),
                    _ => Vec::new(),
                };
                Reply::Json(
                    200,
                    json!({ "commandStatus": "CMD_OK", "groups": script.remote_groups }),
                )
            }
            other => other,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        bearer: Option<&str>,
        body: Value,
    ) -> Result<RawResponse, SessionError> {
        let reply = self.answer(endpoint, bearer, body);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match reply {
            Reply::Json(status, v) => Ok(RawResponse::new(status, v.to_string())),
            Reply::Text(status, s) => Ok(RawResponse::new(status, s)),
            Reply::Unreachable(msg) => Err(SessionError::Transport(msg)),
            // Resolved in `answer`.
            Reply::OpenSession(_) | Reply::CurrentGroups | Reply::EchoCommand => Err(
                SessionError::Transport("unresolved scripted reply".to_string()),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An installation with the default arming profile ({1} stay, {2} night).
pub fn installation(system_id: i64) -> Installation {
    Installation::new(
        system_id,
        format!("TX{system_id:04}"),
        format!("CU{system_id:04}"),
        1234,
        format!("Home {system_id}"),
        ArmingProfile::default(),
    )
}

/// No retry sleeps, no cooldown.
pub fn fast_settings(max_attempts: u32) -> AccountSettings {
    AccountSettings {
        policy: RetryPolicy::immediate(max_attempts),
        cooldown: Duration::ZERO,
    }
}

/// `{"diagralId": .., "systems": [..]}` for `(id, internal name)` pairs.
pub fn systems_listing(entries: &[(i64, &str)]) -> Reply {
    let systems: Vec<Value> = entries
        .iter()
        .map(|(id, name)| {
            json!({
                "id": id,
                "role": 1,
                "name": name,
                "installationComplete": true,
                "standalone": false,
            })
        })
        .collect();
    Reply::Json(200, json!({ "diagralId": 4242, "systems": systems }))
}

pub struct AccountFixture {
    pub account: Arc<Account>,
    pub events: broadcast::Sender<SyncEvent>,
    pub feed: TriggerFeed,
}

/// Account over `transport` with one installation per id, fast settings and
/// a queued trigger source.
pub fn account(transport: &Arc<ScriptedTransport>, system_ids: &[i64]) -> AccountFixture {
    account_on_bus(transport, LOGIN, system_ids, AccountRegistry::event_bus())
}

pub fn account_on_bus(
    transport: &Arc<ScriptedTransport>,
    login: &str,
    system_ids: &[i64],
    events: broadcast::Sender<SyncEvent>,
) -> AccountFixture {
    let installations = system_ids.iter().copied().map(installation).collect();
    let (source, feed) = QueuedTriggerSource::new();
    let account = Account::new(
        Credential::new(login, PASSWORD),
        Arc::clone(transport) as Arc<dyn Transport>,
        installations,
        fast_settings(3),
        events.clone(),
    )
    .with_trigger_source(Arc::new(source));
    AccountFixture {
        account: Arc::new(account),
        events,
        feed,
    }
}

/// Drain whatever is currently buffered on an event receiver.
pub fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}
