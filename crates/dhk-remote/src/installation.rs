//! Local model of one alarm installation.
//!
//! # Invariants
//! - `session_id` is `Some` only between a successful connect and the
//!   matching disconnect.
//! - `active_groups` ⊆ {1,2,3,4} (enforced by `GroupSet`).
//! - The trigger timestamp persists until `clear_trigger` is called.

use chrono::{DateTime, Utc};
use dhk_reconcile::ArmingProfile;
use dhk_schemas::{GroupSet, InstallationStatus, SecurityState, TargetState};
use serde::Serialize;
use tracing::warn;

/// Position of an installation in its session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoSession,
    Connecting,
    Active,
    Disconnecting,
}

#[derive(Clone, Debug)]
pub struct Installation {
    pub system_id: i64,
    pub transmitter_id: String,
    pub central_id: String,
    pub master_code: u16,
    pub name: String,
    pub profile: ArmingProfile,

    // Backfilled from the systems listing.
    pub role: i64,
    pub installation_complete: bool,
    pub standalone: bool,
    /// Server-side display name, used to correlate trigger notices.
    pub internal_name: String,

    session_id: Option<String>,
    phase: SessionPhase,
    active_groups: GroupSet,
    refreshed_at: Option<DateTime<Utc>>,
    triggered_at: Option<DateTime<Utc>>,
    status_fault: bool,
}

impl Installation {
    pub fn new(
        system_id: i64,
        transmitter_id: impl Into<String>,
        central_id: impl Into<String>,
        master_code: u16,
        name: impl Into<String>,
        profile: ArmingProfile,
    ) -> Self {
        Self {
            system_id,
            transmitter_id: transmitter_id.into(),
            central_id: central_id.into(),
            master_code,
            name: name.into(),
            profile,
            role: 0,
            installation_complete: true,
            standalone: false,
            internal_name: "-".to_string(),
            session_id: None,
            phase: SessionPhase::NoSession,
            active_groups: GroupSet::empty(),
            refreshed_at: None,
            triggered_at: None,
            status_fault: false,
        }
    }

    /// The central-unit id doubles as serial number.
    pub fn serial_number(&self) -> &str {
        &self.central_id
    }

    /// Master code as the zero-padded four-digit string the API expects.
    pub fn master_code_wire(&self) -> String {
        format!("{:04}", self.master_code)
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active_groups(&self) -> &GroupSet {
        &self.active_groups
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// When the pending trigger was detected, if any.
    pub fn trigger(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered_at.is_some()
    }

    pub fn mark_triggered(&mut self, when: DateTime<Utc>) {
        self.triggered_at = Some(when);
    }

    pub fn clear_trigger(&mut self) {
        self.triggered_at = None;
    }

    pub fn status_fault(&self) -> bool {
        self.status_fault
    }

    pub fn set_status_fault(&mut self, fault: bool) {
        self.status_fault = fault;
    }

    pub fn security_state(&self) -> SecurityState {
        self.profile
            .classify(&self.active_groups, self.is_triggered())
    }

    pub fn snapshot(&self, target_state: TargetState) -> InstallationStatus {
        InstallationStatus {
            system_id: self.system_id,
            name: self.name.clone(),
            serial_number: self.central_id.clone(),
            active_groups: self.active_groups.clone(),
            security_state: self.security_state(),
            target_state,
            triggered: self.is_triggered(),
            triggered_at: self.triggered_at,
            status_fault: self.status_fault,
            refreshed_at: self.refreshed_at,
        }
    }

    // -----------------------------------------------------------------------
    // Session-layer mutation
    // -----------------------------------------------------------------------

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub(crate) fn open_session(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.phase = SessionPhase::Active;
    }

    pub(crate) fn close_session(&mut self) {
        self.session_id = None;
        self.phase = SessionPhase::NoSession;
    }

    /// Replace (never merge) the active groups from a server list.
    pub(crate) fn replace_groups_from_wire(&mut self, ids: &[i64]) {
        let (groups, dropped) = GroupSet::from_wire(ids);
        if !dropped.is_empty() {
            warn!(
                system_id = self.system_id,
                ?dropped,
                "ignoring out-of-range zone groups from server"
            );
        }
        self.replace_groups(groups);
    }

    pub(crate) fn replace_groups(&mut self, groups: GroupSet) {
        self.active_groups = groups;
        self.refreshed_at = Some(Utc::now());
    }
}
