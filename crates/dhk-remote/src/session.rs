//! Per-installation session protocol.
//!
//! The remote service allows one live session per installation. A connect
//! answered with "session already open" is resolved by looking up the
//! stale session id, disconnecting it and connecting again; the collision
//! consumes one attempt of the retry budget.
//!
//! # Invariants
//! - Every loop is bounded by `RetryPolicy::max_attempts`.
//! - Active groups are replaced from every successful response, never merged.
//! - A rejected master code fails immediately.

use dhk_schemas::wire::{
    ConnectRequest, ConnectResponse, DisconnectRequest, LastSessionRequest, StateCommandRequest,
    StateCommandResponse, StatusResponse, SystemStateRequest, SystemStateResponse,
    MSG_BAD_PIN_CODE, MSG_SESSION_ALREADY_OPEN, NB_GROUPS,
};
use dhk_schemas::GroupSet;
use tracing::{debug, info, warn};

use crate::{Endpoint, Installation, RemoteGateway, RetryGate, RetryPolicy, SessionError, SessionPhase};

enum ConnectOutcome {
    Opened(String),
    AlreadyOpen,
}

/// Session operations on one installation, borrowed for the duration of a
/// gated account envelope.
pub struct AlarmSession<'a> {
    gateway: &'a RemoteGateway,
    installation: &'a mut Installation,
    policy: &'a RetryPolicy,
}

impl<'a> AlarmSession<'a> {
    pub fn new(
        gateway: &'a RemoteGateway,
        installation: &'a mut Installation,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            installation,
            policy,
        }
    }

    pub fn installation(&self) -> &Installation {
        self.installation
    }

    // -----------------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------------

    /// Open a session, resolving collisions. Returns the new session id.
    pub async fn create_session(&mut self) -> Result<String, SessionError> {
        let mut gate = RetryGate::new("create_session", self.policy);
        loop {
            let attempt = gate.next_attempt().inspect_err(|_| {
                self.installation.set_phase(SessionPhase::NoSession);
            })?;
            self.installation.set_phase(SessionPhase::Connecting);

            match self.try_connect().await {
                Ok(ConnectOutcome::Opened(id)) => {
                    debug!(system_id = self.installation.system_id, attempt, "session opened");
                    return Ok(id);
                }
                Ok(ConnectOutcome::AlreadyOpen) => {
                    info!(
                        system_id = self.installation.system_id,
                        attempt, "session already open; closing the stale one"
                    );
                    let stale = self.last_session_id().await;
                    if let Err(e) = self.disconnect_session(stale.as_deref()).await {
                        self.installation.set_phase(SessionPhase::NoSession);
                        return Err(e);
                    }
                    gate.note(SessionError::RetryableProtocol(
                        "session already open".to_string(),
                    ));
                }
                Err(e) if e.is_retryable() => gate.pause(e).await,
                Err(e) => {
                    self.installation.set_phase(SessionPhase::NoSession);
                    return Err(e);
                }
            }
        }
    }

    async fn try_connect(&mut self) -> Result<ConnectOutcome, SessionError> {
        let inst = &*self.installation;
        let req = ConnectRequest {
            master_code: inst.master_code_wire(),
            transmitter_id: &inst.transmitter_id,
            system_id: inst.system_id,
            role: inst.role,
        };
        let resp = self.gateway.call(Endpoint::Connect, &req).await?;
        let body: ConnectResponse = resp.json().map_err(|e| {
            SessionError::RetryableProtocol(format!(
                "connect response not decodable (http {}): {e}",
                resp.status
            ))
        })?;

        if let Some(id) = body.ttm_session_id {
            self.installation.open_session(id.clone());
            if let Some(groups) = body.groups {
                self.installation.replace_groups_from_wire(&groups);
            }
            return Ok(ConnectOutcome::Opened(id));
        }
        match body.message.as_deref() {
            Some(MSG_BAD_PIN_CODE) => Err(SessionError::Configuration(format!(
                "master code rejected for system {}",
                self.installation.system_id
            ))),
            Some(MSG_SESSION_ALREADY_OPEN) => Ok(ConnectOutcome::AlreadyOpen),
            other => Err(SessionError::RetryableProtocol(format!(
                "connect returned no session id (http {}, message {:?})",
                resp.status, other
            ))),
        }
    }

    /// Close `session`, or the current session when `None`. No-op when no
    /// session id is known. The stored session is cleared on success.
    pub async fn disconnect_session(&mut self, session: Option<&str>) -> Result<(), SessionError> {
        let Some(session) = session
            .map(str::to_owned)
            .or_else(|| self.installation.session_id().map(str::to_owned))
        else {
            return Ok(());
        };

        let previous = self.installation.phase();
        self.installation.set_phase(SessionPhase::Disconnecting);
        let result = self.send_disconnect(&session).await;
        match result {
            Ok(()) => {
                self.installation.close_session();
                Ok(())
            }
            Err(e) => {
                self.installation.set_phase(previous);
                Err(e)
            }
        }
    }

    async fn send_disconnect(&self, session: &str) -> Result<(), SessionError> {
        let req = DisconnectRequest {
            system_id: self.installation.system_id.to_string(),
            ttm_session_id: session,
        };
        let resp = self.gateway.call(Endpoint::Disconnect, &req).await?;
        if !resp.is_ok() {
            return Err(SessionError::RemoteProtocol(format!(
                "disconnect http status {}",
                resp.status
            )));
        }
        let body: StatusResponse = resp
            .json()
            .map_err(|e| SessionError::RemoteProtocol(format!("disconnect body: {e}")))?;
        if !body.is_ok() {
            return Err(SessionError::RemoteProtocol(format!(
                "disconnect status {:?}",
                body.status
            )));
        }
        Ok(())
    }

    /// Best-effort lookup of the session the server still considers open.
    pub async fn last_session_id(&self) -> Option<String> {
        let req = LastSessionRequest {
            system_id: self.installation.system_id,
        };
        let resp = match self.gateway.call(Endpoint::LastSessionId, &req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(system_id = self.installation.system_id, error = %e, "last session lookup failed");
                return None;
            }
        };
        if !resp.is_ok() {
            return None;
        }
        let id = resp.text().trim().trim_matches('"');
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    // -----------------------------------------------------------------------
    // Status and commands
    // -----------------------------------------------------------------------

    /// Refresh active groups. Without a session, opening one is the refresh.
    pub async fn update_status(&mut self) -> Result<(), SessionError> {
        if !self.installation.has_session() {
            self.create_session().await?;
            return Ok(());
        }

        let mut gate = RetryGate::new("update_status", self.policy);
        loop {
            gate.next_attempt()?;
            match self.fetch_groups().await {
                Ok(groups) => {
                    self.installation.replace_groups_from_wire(&groups);
                    return Ok(());
                }
                Err(e) if e.is_retryable() => gate.pause(e).await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_groups(&self) -> Result<Vec<i64>, SessionError> {
        let session = self.current_session()?;
        let req = SystemStateRequest {
            central_id: &self.installation.central_id,
            ttm_session_id: session,
        };
        let resp = self.gateway.call(Endpoint::SystemState, &req).await?;
        if !resp.is_ok() {
            return Err(SessionError::RetryableProtocol(format!(
                "getSystemState http status {}",
                resp.status
            )));
        }
        let body: SystemStateResponse = resp
            .json()
            .map_err(|e| SessionError::RetryableProtocol(format!("getSystemState body: {e}")))?;
        body.groups.ok_or_else(|| {
            SessionError::RetryableProtocol("getSystemState response has no groups".to_string())
        })
    }

    /// Arm exactly `groups`. The empty set is a full deactivation.
    pub async fn send_activation_command(&mut self, groups: &GroupSet) -> Result<(), SessionError> {
        if groups.is_empty() {
            return self.deactivate_alarm().await;
        }
        self.ensure_session().await?;

        // "All groups" has its own state name and an empty list.
        let (state, list) = if groups.is_all() {
            ("on", Vec::new())
        } else {
            ("group", groups.to_wire())
        };
        self.run_command("send_activation_command", state, list, groups)
            .await
    }

    /// Disarm every group.
    pub async fn deactivate_alarm(&mut self) -> Result<(), SessionError> {
        self.ensure_session().await?;
        self.run_command("deactivate_alarm", "off", Vec::new(), &GroupSet::empty())
            .await
    }

    async fn ensure_session(&mut self) -> Result<(), SessionError> {
        if !self.installation.has_session() {
            self.create_session().await?;
        }
        Ok(())
    }

    async fn run_command(
        &mut self,
        operation: &'static str,
        state: &'static str,
        list: Vec<i64>,
        requested: &GroupSet,
    ) -> Result<(), SessionError> {
        let mut gate = RetryGate::new(operation, self.policy);
        loop {
            gate.next_attempt()?;
            let resp = {
                let req = StateCommandRequest {
                    system_state: state,
                    group: list.clone(),
                    current_group: Vec::new(),
                    nb_groups: NB_GROUPS,
                    ttm_session_id: self.current_session()?,
                };
                self.gateway.call(Endpoint::StateCommand, &req).await?
            };
            if !resp.is_ok() {
                gate.pause(SessionError::RetryableProtocol(format!(
                    "stateCommand http status {}",
                    resp.status
                )))
                .await;
                continue;
            }

            let body: StateCommandResponse = resp
                .json()
                .map_err(|e| SessionError::Activation(format!("stateCommand body: {e}")))?;
            if !body.is_ok() {
                return Err(SessionError::Activation(format!(
                    "systemState {state} answered {:?}",
                    body.command_status
                )));
            }
            match body.groups {
                Some(groups) => self.installation.replace_groups_from_wire(&groups),
                None => self.installation.replace_groups(requested.clone()),
            }
            info!(
                system_id = self.installation.system_id,
                state,
                groups = %self.installation.active_groups(),
                "state command accepted"
            );
            return Ok(());
        }
    }

    fn current_session(&self) -> Result<&str, SessionError> {
        self.installation
            .session_id()
            .ok_or_else(|| SessionError::RetryableProtocol("no open session".to_string()))
    }
}
