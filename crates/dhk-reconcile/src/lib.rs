//! dhk-reconcile
//!
//! Derives the single externally visible security state of an installation
//! from the remote service's active zone groups plus the pending trigger
//! flag, and tracks the target state an accessory asked for.
//!
//! Deterministic, pure logic. No IO. No clock.

mod engine;
mod profile;
mod tracker;

pub use engine::reconcile;
pub use profile::ArmingProfile;
pub use tracker::TargetTracker;
