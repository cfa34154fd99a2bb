//! Request and response types for all dhk-daemon HTTP endpoints.
//!
//! Handlers encode them as JSON; the scenario tests decode the same structs
//! to assert on bodies.

use chrono::{DateTime, Utc};
use dhk_schemas::{InstallationStatus, SecurityState, TargetState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub accounts: usize,
    pub installations: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Error class, e.g. "not_found" or a remote error kind such as
    /// "exhausted_retries".
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/installations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationsResponse {
    pub installations: Vec<InstallationStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRequest {
    pub state: TargetState,
}

/// Outcome of a completed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResponse {
    /// Correlates the response with the daemon's log lines.
    pub request_id: Uuid,
    pub system_id: i64,
    pub requested: TargetState,
    pub security_state: SecurityState,
    pub status: InstallationStatus,
}

// ---------------------------------------------------------------------------
// /v1/triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Raw notification subject, e.g. "MAISON : Alarme".
    pub subject: String,
    /// Defaults to the time the daemon received the request.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// Accounts whose trigger feed received the notice.
    pub queued: usize,
}
