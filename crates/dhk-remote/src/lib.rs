//! dhk-remote
//!
//! Client for the vendor alarm cloud: the HTTP transport seam, the
//! account-level gateway (bearer token, login/logout), the per-installation
//! session protocol and its bounded retries.
//!
//! This crate does **not** serialise access between callers. Holding the
//! account gate around a login/…/logout envelope is the caller's job
//! (see `dhk-sync`).

mod endpoint;
mod error;
mod gateway;
mod installation;
mod retry;
mod session;
mod transport;

pub use endpoint::Endpoint;
pub use error::SessionError;
pub use gateway::RemoteGateway;
pub use installation::{Installation, SessionPhase};
pub use retry::{RetryGate, RetryPolicy};
pub use session::AlarmSession;
pub use transport::{HttpTransport, RawResponse, Transport, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
