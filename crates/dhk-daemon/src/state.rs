//! Shared runtime state for dhk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Installation status is
//! owned by the sync layer; this module only relays its events to the SSE
//! bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dhk_schemas::InstallationStatus;
use dhk_sync::{AccountRegistry, SyncEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the daemon bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    Status(InstallationStatus),
    Trigger {
        system_id: i64,
        at: DateTime<Utc>,
    },
    CycleFailed {
        account: String,
        operation: String,
        kind: String,
        error: String,
    },
}

impl BusMsg {
    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::Trigger { .. } => "trigger",
            BusMsg::CycleFailed { .. } => "cycle_failed",
        }
    }
}

impl From<SyncEvent> for BusMsg {
    fn from(ev: SyncEvent) -> Self {
        match ev {
            SyncEvent::Status(s) => BusMsg::Status(s),
            SyncEvent::TriggerDetected { system_id, at } => BusMsg::Trigger { system_id, at },
            SyncEvent::CycleFailed {
                account,
                operation,
                kind,
                error,
            } => BusMsg::CycleFailed {
                account,
                operation: operation.to_string(),
                kind: kind.to_string(),
                error,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Fan-out to every connected `/v1/stream` client.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub registry: Arc<AccountRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "dhk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            registry,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since the daemon first asked for its uptime.
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Keeps idle SSE clients alive with a periodic heartbeat.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task forwarding sync events onto the SSE bus.
///
/// Ends when the registry's event channel closes.
pub fn spawn_event_relay(state: &AppState) -> tokio::task::JoinHandle<()> {
    let mut rx = state.registry.subscribe();
    let bus = state.bus.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let _ = bus.send(BusMsg::from(ev));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event relay lagged; status events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
