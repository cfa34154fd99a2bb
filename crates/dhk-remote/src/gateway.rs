//! Account-level envelope: bearer token, login/logout and request signing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dhk_schemas::wire::{LoginRequest, LoginResponse, LogoutRequest, StatusResponse, SystemsResponse};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{Endpoint, Installation, RawResponse, SessionError, Transport};

/// Authenticated access to the vendor API for one account.
///
/// The bearer token is set by [`login`](Self::login) and cleared only by a
/// successful [`logout`](Self::logout).
pub struct RemoteGateway {
    login: String,
    password: String,
    transport: Arc<dyn Transport>,
    bearer: Option<String>,
    diagral_id: Option<Value>,
}

impl fmt::Debug for RemoteGateway {
    // Password and token stay out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteGateway")
            .field("login", &self.login)
            .field("authenticated", &self.bearer.is_some())
            .finish()
    }
}

impl RemoteGateway {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            transport,
            bearer: None,
            diagral_id: None,
        }
    }

    pub fn login_name(&self) -> &str {
        &self.login
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Account id reported by the systems listing, if seen.
    pub fn diagral_id(&self) -> Option<&Value> {
        self.diagral_id.as_ref()
    }

    /// Send `body` to `endpoint`, attaching the bearer token on every
    /// endpoint except login. The response is returned uninterpreted.
    pub async fn request(&self, endpoint: Endpoint, body: Value) -> Result<RawResponse, SessionError> {
        let bearer = if endpoint.is_login() {
            None
        } else {
            Some(self.bearer.as_deref().ok_or(SessionError::NotAuthenticated)?)
        };
        self.transport.send(endpoint, bearer, body).await
    }

    /// Typed convenience over [`request`](Self::request).
    pub async fn call<T: Serialize>(
        &self,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<RawResponse, SessionError> {
        let value = serde_json::to_value(body)
            .map_err(|e| SessionError::Configuration(format!("{endpoint}: encode failed: {e}")))?;
        self.request(endpoint, value).await
    }

    /// Obtain a bearer token. `Ok(false)` means the credentials were refused
    /// or the body carried no token; transport failures are `Err`.
    pub async fn login(&mut self) -> Result<bool, SessionError> {
        let resp = self
            .call(
                Endpoint::Login,
                &LoginRequest {
                    username: &self.login,
                    password: &self.password,
                },
            )
            .await?;
        if !resp.is_ok() {
            warn!(account = %self.login, status = resp.status, "login refused");
            return Ok(false);
        }
        match resp.json::<LoginResponse>() {
            Ok(LoginResponse {
                session_id: Some(token),
            }) => {
                debug!(account = %self.login, "logged in");
                self.bearer = Some(token);
                Ok(true)
            }
            Ok(_) => {
                warn!(account = %self.login, "login response carried no sessionId");
                Ok(false)
            }
            Err(e) => {
                warn!(account = %self.login, error = %e, "login response not decodable");
                Ok(false)
            }
        }
    }

    /// End the account session. On any refusal the token is kept.
    pub async fn logout(&mut self) -> Result<(), SessionError> {
        let resp = self.call(Endpoint::Logout, &LogoutRequest::default()).await?;
        if !resp.is_ok() {
            return Err(SessionError::RemoteProtocol(format!(
                "logout http status {}",
                resp.status
            )));
        }
        let body: StatusResponse = resp
            .json()
            .map_err(|e| SessionError::RemoteProtocol(format!("logout body: {e}")))?;
        if !body.is_ok() {
            return Err(SessionError::RemoteProtocol(format!(
                "logout status {:?}",
                body.status
            )));
        }
        debug!(account = %self.login, "logged out");
        self.bearer = None;
        Ok(())
    }

    /// Fetch the account's installation listing.
    pub async fn list_systems(&mut self) -> Result<SystemsResponse, SessionError> {
        let resp = self.request(Endpoint::Systems, Value::Object(Default::default())).await?;
        if !resp.is_ok() {
            return Err(SessionError::RemoteProtocol(format!(
                "getSystems http status {}",
                resp.status
            )));
        }
        let listing: SystemsResponse = resp
            .json()
            .map_err(|e| SessionError::RemoteProtocol(format!("getSystems body: {e}")))?;
        if listing.diagral_id.is_some() {
            self.diagral_id = listing.diagral_id.clone();
        }
        Ok(listing)
    }

    /// Backfill role, completeness, standalone flag and internal name of the
    /// installations already known locally. Unknown remote ids are ignored.
    pub async fn initialize_installations(
        &mut self,
        installations: &mut BTreeMap<i64, Installation>,
    ) -> Result<(), SessionError> {
        let listing = self.list_systems().await?;
        for remote in listing.systems {
            let Some(local) = installations.get_mut(&remote.id) else {
                debug!(account = %self.login, system_id = remote.id, "remote system not configured; skipped");
                continue;
            };
            local.role = remote.role;
            local.internal_name = remote.name;
            local.installation_complete = remote.installation_complete;
            local.standalone = remote.standalone;
            info!(
                account = %self.login,
                system_id = local.system_id,
                role = local.role,
                internal_name = %local.internal_name,
                "installation initialised"
            );
        }
        Ok(())
    }
}
