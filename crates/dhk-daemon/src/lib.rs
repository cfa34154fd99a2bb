//! dhk-daemon library target.
//!
//! Exposes the router, state and CLI for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod cli;
pub mod routes;
pub mod state;
