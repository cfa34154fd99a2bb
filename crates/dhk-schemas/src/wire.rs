//! Request/response bodies for the vendor cloud API.
//!
//! One struct per endpoint direction. Field names follow the remote JSON
//! (camelCase). Response structs tolerate missing fields: the session
//! layer decides which absences are errors.

use serde::{Deserialize, Serialize};

/// `message` value on connect when the master code is rejected.
pub const MSG_BAD_PIN_CODE: &str = "transmitter.connection.badpincode";
/// `message` value on connect when another session is still open.
pub const MSG_SESSION_ALREADY_OPEN: &str = "transmitter.connection.sessionalreadyopen";

/// `status` value of a successful logout/disconnect.
pub const STATUS_OK: &str = "OK";
/// `commandStatus` value of an accepted state command.
pub const COMMAND_OK: &str = "CMD_OK";

/// Number of zone groups announced in every state command.
pub const NB_GROUPS: &str = "4";

// ---------------------------------------------------------------------------
// Account envelope
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Always the literal string `"null"`.
    pub system_id: &'static str,
}

impl Default for LogoutRequest {
    fn default() -> Self {
        Self { system_id: "null" }
    }
}

/// Body of logout and disconnect responses.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some(STATUS_OK)
    }
}

// ---------------------------------------------------------------------------
// Installation session
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest<'a> {
    /// Zero-padded four-digit string.
    pub master_code: String,
    pub transmitter_id: &'a str,
    pub system_id: i64,
    pub role: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    #[serde(default)]
    pub ttm_session_id: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<i64>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest<'a> {
    /// Sent as a string on this endpoint.
    pub system_id: String,
    pub ttm_session_id: &'a str,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSessionRequest {
    pub system_id: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStateRequest<'a> {
    pub central_id: &'a str,
    pub ttm_session_id: &'a str,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SystemStateResponse {
    #[serde(default)]
    pub groups: Option<Vec<i64>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCommandRequest<'a> {
    /// `"on"`, `"off"` or `"group"`.
    pub system_state: &'static str,
    pub group: Vec<i64>,
    pub current_group: Vec<i64>,
    pub nb_groups: &'static str,
    pub ttm_session_id: &'a str,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCommandResponse {
    #[serde(default)]
    pub command_status: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<i64>>,
}

impl StateCommandResponse {
    pub fn is_ok(&self) -> bool {
        self.command_status.as_deref() == Some(COMMAND_OK)
    }
}

// ---------------------------------------------------------------------------
// Account configuration listing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemsResponse {
    #[serde(default)]
    pub diagral_id: Option<serde_json::Value>,
    #[serde(default)]
    pub systems: Vec<RemoteSystem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSystem {
    pub id: i64,
    #[serde(default)]
    pub role: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub installation_complete: bool,
    #[serde(default)]
    pub standalone: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_request_uses_remote_field_names() {
        let req = ConnectRequest {
            master_code: "0042".to_string(),
            transmitter_id: "AB12",
            system_id: 7,
            role: 1,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"masterCode": "0042", "transmitterId": "AB12", "systemId": 7, "role": 1})
        );
    }

    #[test]
    fn state_command_request_shape() {
        let req = StateCommandRequest {
            system_state: "group",
            group: vec![1, 3],
            current_group: vec![],
            nb_groups: NB_GROUPS,
            ttm_session_id: "t-1",
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "systemState": "group",
                "group": [1, 3],
                "currentGroup": [],
                "nbGroups": "4",
                "ttmSessionId": "t-1"
            })
        );
    }

    #[test]
    fn connect_response_tolerates_message_only_body() {
        let r: ConnectResponse =
            serde_json::from_value(json!({"message": MSG_SESSION_ALREADY_OPEN})).unwrap();
        assert!(r.ttm_session_id.is_none());
        assert_eq!(r.message.as_deref(), Some(MSG_SESSION_ALREADY_OPEN));
    }

    #[test]
    fn systems_response_reads_listing() {
        let r: SystemsResponse = serde_json::from_value(json!({
            "diagralId": 991,
            "systems": [
                {"id": 12, "role": 1, "name": "Maison", "installationComplete": true, "standalone": false}
            ]
        }))
        .unwrap();
        assert_eq!(r.systems.len(), 1);
        assert_eq!(r.systems[0].name, "Maison");
        assert_eq!(r.diagral_id, Some(json!(991)));
    }

    #[test]
    fn status_response_ok_only_on_literal_ok() {
        let ok: StatusResponse = serde_json::from_value(json!({"status": "OK"})).unwrap();
        let ko: StatusResponse = serde_json::from_value(json!({"status": "KO"})).unwrap();
        let missing: StatusResponse = serde_json::from_value(json!({})).unwrap();
        assert!(ok.is_ok());
        assert!(!ko.is_ok());
        assert!(!missing.is_ok());
    }
}
