//! Shared value types for the alarm bridge.
//!
//! Zone-group sets, the externally visible security states and the
//! request/response bodies of the vendor API. No IO.

mod groups;
mod state;
pub mod wire;

pub use groups::{GroupSet, InvalidGroup, GROUP_COUNT, MAX_GROUP, MIN_GROUP};
pub use state::{InstallationStatus, SecurityState, TargetState};
