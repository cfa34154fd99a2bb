//! Error taxonomy for remote calls.

use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure of an account or installation operation against the vendor API.
#[derive(Debug)]
pub enum SessionError {
    /// Local configuration is wrong (e.g. master code rejected). Never retried.
    Configuration(String),
    /// Missing expected field, transient non-200 or session collision.
    /// Retried up to the policy bound.
    RetryableProtocol(String),
    /// The retry bound was reached.
    ExhaustedRetries {
        operation: &'static str,
        attempts: u32,
        last: Option<Box<SessionError>>,
    },
    /// Explicit non-OK status on logout, disconnect or system listing.
    RemoteProtocol(String),
    /// A state command was answered with something other than `CMD_OK`.
    Activation(String),
    /// Connection, TLS or timeout failure below the protocol.
    Transport(String),
    /// A bearer-authenticated endpoint was called before login.
    NotAuthenticated,
}

impl SessionError {
    /// `true` when another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::RetryableProtocol(_))
    }

    /// `true` for network-level noise (logged at warn, never escalated).
    pub fn is_transport(&self) -> bool {
        match self {
            SessionError::Transport(_) => true,
            SessionError::ExhaustedRetries {
                last: Some(last), ..
            } => last.is_transport(),
            _ => false,
        }
    }

    /// Short stable label for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "configuration",
            SessionError::RetryableProtocol(_) => "retryable_protocol",
            SessionError::ExhaustedRetries { .. } => "exhausted_retries",
            SessionError::RemoteProtocol(_) => "remote_protocol",
            SessionError::Activation(_) => "activation",
            SessionError::Transport(_) => "transport",
            SessionError::NotAuthenticated => "not_authenticated",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            SessionError::RetryableProtocol(msg) => write!(f, "protocol error: {msg}"),
            SessionError::ExhaustedRetries {
                operation,
                attempts,
                last: Some(last),
            } => write!(
                f,
                "{operation} gave up after {attempts} attempts (last error: {last})"
            ),
            SessionError::ExhaustedRetries {
                operation,
                attempts,
                last: None,
            } => write!(f, "{operation} gave up after {attempts} attempts"),
            SessionError::RemoteProtocol(msg) => write!(f, "remote refused: {msg}"),
            SessionError::Activation(msg) => write!(f, "activation error: {msg}"),
            SessionError::Transport(msg) => write!(f, "transport error: {msg}"),
            SessionError::NotAuthenticated => write!(f, "not logged in"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::ExhaustedRetries {
                last: Some(last), ..
            } => Some(last.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
