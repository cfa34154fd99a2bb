use chrono::{DateTime, Utc};
use dhk_schemas::InstallationStatus;
use serde::Serialize;

/// Messages broadcast to observers (the daemon's SSE stream).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// An installation's published status changed.
    Status(InstallationStatus),
    /// A trigger notice matched an installation.
    TriggerDetected { system_id: i64, at: DateTime<Utc> },
    /// A gated envelope for one account failed.
    CycleFailed {
        account: String,
        operation: &'static str,
        kind: &'static str,
        error: String,
    },
}
