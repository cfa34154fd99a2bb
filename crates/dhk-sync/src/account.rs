//! Account envelope and its mutual-exclusion gate.
//!
//! # Invariants
//! - Every remote call for an account happens while holding its gate:
//!   poll cycles, on-demand commands and initialisation never interleave
//!   their login/…/logout envelopes.
//! - The cooldown is slept before the gate is released.
//! - A status snapshot is published after every gated step that touched
//!   an installation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dhk_reconcile::TargetTracker;
use dhk_remote::{AlarmSession, Installation, RemoteGateway, RetryPolicy, SessionError, Transport};
use dhk_schemas::{InstallationStatus, SecurityState, TargetState};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::trigger::{alarm_subject_names, is_matchable};
use crate::{InstallationHandle, SyncEvent, TriggerSource};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Login/password pair identifying an account.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Credential {
    pub login: String,
    pub password: String,
}

impl Credential {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("password", &"REDACTED")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSettings {
    pub policy: RetryPolicy,
    pub cooldown: Duration,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            cooldown: Duration::from_secs(1),
        }
    }
}

/// State only reachable through the gate.
struct AccountSession {
    gateway: RemoteGateway,
    installations: BTreeMap<i64, Installation>,
}

pub struct Account {
    credential: Credential,
    settings: AccountSettings,
    gate: Mutex<AccountSession>,
    // Published outside the gate so readers never wait on a cycle.
    published: BTreeMap<i64, watch::Sender<InstallationStatus>>,
    trackers: StdMutex<BTreeMap<i64, TargetTracker>>,
    trigger_source: Option<Arc<dyn TriggerSource>>,
    events: broadcast::Sender<SyncEvent>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("login", &self.credential.login)
            .field("installations", &self.published.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Account {
    pub fn new(
        credential: Credential,
        transport: Arc<dyn Transport>,
        installations: Vec<Installation>,
        settings: AccountSettings,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let mut published = BTreeMap::new();
        let mut trackers = BTreeMap::new();
        let mut by_id = BTreeMap::new();
        for inst in installations {
            let tracker = TargetTracker::new();
            let snapshot = inst.snapshot(tracker.reported_target(inst.security_state()));
            let (tx, _rx) = watch::channel(snapshot);
            published.insert(inst.system_id, tx);
            trackers.insert(inst.system_id, tracker);
            by_id.insert(inst.system_id, inst);
        }
        let gateway = RemoteGateway::new(
            credential.login.clone(),
            credential.password.clone(),
            transport,
        );
        Self {
            credential,
            settings,
            gate: Mutex::new(AccountSession {
                gateway,
                installations: by_id,
            }),
            published,
            trackers: StdMutex::new(trackers),
            trigger_source: None,
            events,
        }
    }

    pub fn with_trigger_source(mut self, source: Arc<dyn TriggerSource>) -> Self {
        self.trigger_source = Some(source);
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn login(&self) -> &str {
        &self.credential.login
    }

    pub fn system_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.published.keys().copied()
    }

    pub fn has_installation(&self, system_id: i64) -> bool {
        self.published.contains_key(&system_id)
    }

    /// Accessory-facing handles, one per installation.
    pub fn handles(self: &Arc<Self>) -> Vec<InstallationHandle> {
        self.published
            .iter()
            .map(|(id, tx)| InstallationHandle::new(*id, Arc::clone(self), tx.subscribe()))
            .collect()
    }

    pub fn handle(self: &Arc<Self>, system_id: i64) -> Option<InstallationHandle> {
        self.published
            .get(&system_id)
            .map(|tx| InstallationHandle::new(system_id, Arc::clone(self), tx.subscribe()))
    }

    pub fn status(&self, system_id: i64) -> Option<InstallationStatus> {
        self.published.get(&system_id).map(|tx| tx.borrow().clone())
    }

    // -----------------------------------------------------------------------
    // Gated envelopes
    // -----------------------------------------------------------------------

    /// login → backfill installation metadata from the systems listing → logout.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let mut guard = self.gate.lock().await;
        let session = &mut *guard;

        let body = match login(&mut session.gateway).await {
            Ok(()) => {
                session
                    .gateway
                    .initialize_installations(&mut session.installations)
                    .await
            }
            Err(e) => Err(e),
        };
        let result = self.close_envelope(&mut session.gateway, body, true).await;

        for inst in session.installations.values() {
            self.publish(inst);
        }
        result
    }

    /// One probe cycle: login → (connect, disconnect) per installation →
    /// logout → cooldown.
    ///
    /// Opening a session returns the active groups, so the churn itself is
    /// the refresh. Every installation is probed and flagged from its own
    /// outcome; the first failure is returned after logout.
    pub async fn poll_cycle(&self) -> Result<(), SessionError> {
        let mut guard = self.gate.lock().await;
        let session = &mut *guard;
        debug!(account = %self.credential.login, "poll cycle start");

        let body = self.probe_all(session).await;
        let result = self.close_envelope(&mut session.gateway, body, true).await;
        tokio::time::sleep(self.settings.cooldown).await;

        debug!(account = %self.credential.login, ok = result.is_ok(), "poll cycle end");
        result
    }

    async fn probe_all(&self, session: &mut AccountSession) -> Result<(), SessionError> {
        if let Err(e) = login(&mut session.gateway).await {
            for inst in session.installations.values_mut() {
                inst.set_status_fault(true);
                self.publish(inst);
            }
            return Err(e);
        }
        let mut first_err = None;
        for inst in session.installations.values_mut() {
            let outcome = probe(&session.gateway, inst, &self.settings.policy).await;
            inst.set_status_fault(outcome.is_err());
            self.publish(inst);
            if let Err(e) = outcome {
                warn!(
                    account = %self.credential.login,
                    system_id = inst.system_id,
                    error = %e,
                    "installation probe failed"
                );
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// On-demand command: login → connect → command → disconnect → logout →
    /// cooldown. Returns the reconciled state after the command.
    ///
    /// A successful disarm clears the installation's trigger flag. A logout
    /// failure after a successful command is logged, not returned.
    pub async fn change_state(
        &self,
        system_id: i64,
        target: TargetState,
    ) -> Result<SecurityState, SessionError> {
        if !self.has_installation(system_id) {
            return Err(SessionError::Configuration(format!(
                "system {system_id} is not configured for this account"
            )));
        }
        self.request_target(system_id, target);

        let mut guard = self.gate.lock().await;
        let session = &mut *guard;
        let Some(inst) = session.installations.get_mut(&system_id) else {
            return Err(SessionError::Configuration(format!(
                "system {system_id} is not configured for this account"
            )));
        };
        info!(account = %self.credential.login, system_id, target = %target, "state change requested");

        let body = match login(&mut session.gateway).await {
            Ok(()) => command(&session.gateway, inst, target, &self.settings.policy).await,
            Err(e) => Err(e),
        };

        match &body {
            Ok(()) => {
                inst.set_status_fault(false);
                if target == TargetState::Disarmed && inst.is_triggered() {
                    info!(system_id, "trigger acknowledged by disarm");
                    inst.clear_trigger();
                }
            }
            Err(_) => inst.set_status_fault(true),
        }
        self.publish(inst);
        let state = inst.security_state();

        let result = self.close_envelope(&mut session.gateway, body, false).await;
        tokio::time::sleep(self.settings.cooldown).await;
        result.map(|()| state)
    }

    /// Logout unless login never succeeded. The body's error wins; a logout
    /// failure after a successful body is returned when `strict`, logged
    /// otherwise.
    async fn close_envelope(
        &self,
        gateway: &mut RemoteGateway,
        body: Result<(), SessionError>,
        strict: bool,
    ) -> Result<(), SessionError> {
        if !gateway.is_authenticated() {
            return body;
        }
        match (body, gateway.logout().await) {
            (body, Ok(())) => body,
            (Ok(()), Err(e)) if strict => Err(e),
            (Ok(()), Err(e)) => {
                error!(account = %self.credential.login, error = %e, "logout failed");
                Ok(())
            }
            (Err(e), Err(logout_err)) => {
                warn!(account = %self.credential.login, error = %logout_err, "logout after failed envelope also failed");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Poll the account's trigger source, if any, and apply its notices.
    /// Returns the number of installations marked triggered.
    pub async fn check_triggers(&self) -> anyhow::Result<usize> {
        let Some(source) = &self.trigger_source else {
            return Ok(0);
        };
        let notices = source.poll().await?;
        let mut marked = 0;
        for n in notices {
            marked += self.on_trigger_subject(&n.subject, n.received_at).await;
        }
        Ok(marked)
    }

    /// Mark every installation whose internal name is `internal_name`.
    pub async fn on_trigger_detected(&self, internal_name: &str, when: DateTime<Utc>) -> usize {
        if !is_matchable(internal_name) {
            return 0;
        }
        self.mark_triggered(when, |inst| inst.internal_name == internal_name)
            .await
    }

    /// Mark every installation the alarm subject line refers to.
    pub async fn on_trigger_subject(&self, subject: &str, when: DateTime<Utc>) -> usize {
        self.mark_triggered(when, |inst| {
            !alarm_subject_names(subject, [inst.internal_name.as_str()]).is_empty()
        })
        .await
    }

    async fn mark_triggered<F>(&self, when: DateTime<Utc>, matches: F) -> usize
    where
        F: Fn(&Installation) -> bool,
    {
        let mut guard = self.gate.lock().await;
        let mut marked = 0;
        for inst in guard.installations.values_mut() {
            if !matches(inst) {
                continue;
            }
            warn!(
                account = %self.credential.login,
                system_id = inst.system_id,
                at = %when,
                "alarm trigger detected"
            );
            inst.mark_triggered(when);
            marked += 1;
            let _ = self.events.send(SyncEvent::TriggerDetected {
                system_id: inst.system_id,
                at: when,
            });
            self.publish(inst);
        }
        marked
    }

    // -----------------------------------------------------------------------
    // Publication
    // -----------------------------------------------------------------------

    fn trackers(&self) -> MutexGuard<'_, BTreeMap<i64, TargetTracker>> {
        self.trackers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the requested target and show it immediately.
    fn request_target(&self, system_id: i64, target: TargetState) {
        if let Some(t) = self.trackers().get_mut(&system_id) {
            t.request(target);
        }
        if let Some(tx) = self.published.get(&system_id) {
            let mut changed = None;
            tx.send_modify(|s| {
                if s.target_state != target {
                    s.target_state = target;
                    changed = Some(s.clone());
                }
            });
            if let Some(s) = changed {
                let _ = self.events.send(SyncEvent::Status(s));
            }
        }
    }

    fn publish(&self, inst: &Installation) {
        let state = inst.security_state();
        let target = {
            let mut trackers = self.trackers();
            let tracker = trackers.entry(inst.system_id).or_default();
            tracker.observe(state);
            tracker.reported_target(state)
        };
        let snapshot = inst.snapshot(target);
        let Some(tx) = self.published.get(&inst.system_id) else {
            return;
        };
        if sans_clock(&tx.borrow()) == sans_clock(&snapshot) {
            tx.send_replace(snapshot);
            return;
        }
        tx.send_replace(snapshot.clone());
        let _ = self.events.send(SyncEvent::Status(snapshot));
    }

    pub(crate) fn report_failure(&self, operation: &'static str, err: &SessionError) {
        if err.is_transport() {
            warn!(account = %self.credential.login, operation, error = %err, "remote unreachable");
        } else {
            error!(account = %self.credential.login, operation, kind = err.kind(), error = %err, "envelope failed");
        }
        let _ = self.events.send(SyncEvent::CycleFailed {
            account: self.credential.login.clone(),
            operation,
            kind: err.kind(),
            error: err.to_string(),
        });
    }
}

/// Status without the refresh timestamp, for change detection.
fn sans_clock(s: &InstallationStatus) -> InstallationStatus {
    InstallationStatus {
        refreshed_at: None,
        ..s.clone()
    }
}

async fn login(gateway: &mut RemoteGateway) -> Result<(), SessionError> {
    if gateway.login().await? {
        Ok(())
    } else {
        Err(SessionError::RemoteProtocol(format!(
            "login refused for {}",
            gateway.login_name()
        )))
    }
}

/// Session churn that refreshes the active groups.
async fn probe(
    gateway: &RemoteGateway,
    inst: &mut Installation,
    policy: &RetryPolicy,
) -> Result<(), SessionError> {
    let mut session = AlarmSession::new(gateway, inst, policy);
    session.create_session().await?;
    session.disconnect_session(None).await
}

async fn command(
    gateway: &RemoteGateway,
    inst: &mut Installation,
    target: TargetState,
    policy: &RetryPolicy,
) -> Result<(), SessionError> {
    let groups = inst.profile.groups_for(target);
    let mut session = AlarmSession::new(gateway, inst, policy);
    session.create_session().await?;
    let outcome = session.send_activation_command(&groups).await;
    // The installation session is released even after a refused command.
    let disconnect = session.disconnect_session(None).await;
    outcome?;
    disconnect
}
