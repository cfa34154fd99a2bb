//! Bounded retries.
//!
//! `RetryGate` is driven by an explicit loop in the caller:
//!
//! ```ignore
//! let mut gate = RetryGate::new("update_status", policy);
//! loop {
//!     gate.next_attempt()?;
//!     match call().await {
//!         Ok(v) => return Ok(v),
//!         Err(e) if e.is_retryable() => gate.pause(e).await,
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```
//!
//! # Invariants
//! - At most `max_attempts` calls to `next_attempt` succeed.
//! - No sleep follows the final attempt.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::SessionError;

/// Attempt bound and pacing for remote retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the random extra delay added to `base_delay`.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `base_delay + rand(0..=jitter)`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay + Duration::from_millis(extra)
    }
}

/// Per-operation attempt counter.
#[derive(Debug)]
pub struct RetryGate<'p> {
    operation: &'static str,
    policy: &'p RetryPolicy,
    attempts: u32,
    last: Option<SessionError>,
}

impl<'p> RetryGate<'p> {
    pub fn new(operation: &'static str, policy: &'p RetryPolicy) -> Self {
        Self {
            operation,
            policy,
            attempts: 0,
            last: None,
        }
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Claim the next attempt (1-based), or fail with `ExhaustedRetries`
    /// carrying the last recorded error.
    pub fn next_attempt(&mut self) -> Result<u32, SessionError> {
        if self.attempts >= self.policy.max_attempts {
            return Err(SessionError::ExhaustedRetries {
                operation: self.operation,
                attempts: self.attempts,
                last: self.last.take().map(Box::new),
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Record a failed attempt without sleeping.
    pub fn note(&mut self, err: SessionError) {
        if err.is_transport() {
            warn!(
                operation = self.operation,
                attempt = self.attempts,
                max_attempts = self.policy.max_attempts,
                error = %err,
                "remote attempt failed"
            );
        } else {
            debug!(
                operation = self.operation,
                attempt = self.attempts,
                max_attempts = self.policy.max_attempts,
                error = %err,
                "remote attempt failed"
            );
        }
        self.last = Some(err);
    }

    /// Record a failed attempt and sleep before the next one.
    pub async fn pause(&mut self, err: SessionError) {
        self.note(err);
        if self.attempts < self.policy.max_attempts {
            let delay = self.policy.next_delay();
            tokio::time::sleep(delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
