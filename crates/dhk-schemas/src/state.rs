use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GroupSet;

/// Externally visible security state of one installation.
///
/// The numeric codes match the accessory protocol's security-system
/// characteristic values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
    StayArmed,
    AwayArmed,
    NightArmed,
    Disarmed,
    Triggered,
}

impl SecurityState {
    pub fn as_code(&self) -> u8 {
        match self {
            SecurityState::StayArmed => 0,
            SecurityState::AwayArmed => 1,
            SecurityState::NightArmed => 2,
            SecurityState::Disarmed => 3,
            SecurityState::Triggered => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityState::StayArmed => "stay_armed",
            SecurityState::AwayArmed => "away_armed",
            SecurityState::NightArmed => "night_armed",
            SecurityState::Disarmed => "disarmed",
            SecurityState::Triggered => "triggered",
        }
    }

    /// `true` for every state in which at least one zone is armed.
    pub fn is_armed(&self) -> bool {
        !matches!(self, SecurityState::Disarmed)
    }

    /// The target an accessory would request to reach this state.
    ///
    /// `Triggered` is not a requestable target and maps to `None`.
    pub fn as_target(&self) -> Option<TargetState> {
        match self {
            SecurityState::StayArmed => Some(TargetState::StayArmed),
            SecurityState::AwayArmed => Some(TargetState::AwayArmed),
            SecurityState::NightArmed => Some(TargetState::NightArmed),
            SecurityState::Disarmed => Some(TargetState::Disarmed),
            SecurityState::Triggered => None,
        }
    }
}

impl fmt::Display for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state the accessory collaborator may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    StayArmed,
    AwayArmed,
    NightArmed,
    Disarmed,
}

impl TargetState {
    pub fn as_code(&self) -> u8 {
        self.as_security_state().as_code()
    }

    /// Parse an accessory target code (0..=3).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TargetState::StayArmed),
            1 => Some(TargetState::AwayArmed),
            2 => Some(TargetState::NightArmed),
            3 => Some(TargetState::Disarmed),
            _ => None,
        }
    }

    pub fn as_security_state(&self) -> SecurityState {
        match self {
            TargetState::StayArmed => SecurityState::StayArmed,
            TargetState::AwayArmed => SecurityState::AwayArmed,
            TargetState::NightArmed => SecurityState::NightArmed,
            TargetState::Disarmed => SecurityState::Disarmed,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_security_state().as_str())
    }
}

/// Point-in-time view of one installation, published after every
/// synchronisation step and read by the accessory side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub system_id: i64,
    pub name: String,
    pub serial_number: String,
    pub active_groups: GroupSet,
    pub security_state: SecurityState,
    pub target_state: TargetState,
    /// Raw triggered flag (may be set while `security_state` is not `Triggered`).
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub status_fault: bool,
    /// Last time the active groups were refreshed from the remote service.
    pub refreshed_at: Option<DateTime<Utc>>,
}
