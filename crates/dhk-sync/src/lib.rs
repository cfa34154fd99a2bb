//! dhk-sync
//!
//! Keeps the local installation model in step with the vendor cloud:
//! per-account mutual exclusion, the periodic probe loop, on-demand
//! commands and the trigger side channel.
//!
//! Readers (the accessory side) pull published snapshots and never wait on
//! network activity.

mod account;
mod event;
mod handle;
mod registry;
mod scheduler;
mod trigger;

pub use account::{Account, AccountSettings, Credential};
pub use event::SyncEvent;
pub use handle::InstallationHandle;
pub use registry::{account_settings, AccountRegistry};
pub use scheduler::SyncScheduler;
pub use trigger::{
    alarm_subject_names, QueuedTriggerSource, TriggerFeed, TriggerNotice, TriggerSource,
    ALARM_SUFFIX,
};
