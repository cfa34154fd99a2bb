//! Trigger-notification seam.
//!
//! The collaborator that detects "alarm fired" notices owns its own
//! transport and parsing; the bridge only sees subject lines with a
//! timestamp and matches them against installation internal names.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// Suffix the vendor appends to alarm notification subjects.
pub const ALARM_SUFFIX: &str = " : Alarme";

/// Placeholder internal name of an installation not yet initialised.
const UNINITIALISED_NAME: &str = "-";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerNotice {
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

impl TriggerNotice {
    pub fn new(subject: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            received_at,
        }
    }
}

/// Source of trigger notices, polled on the trigger cadence.
#[async_trait]
pub trait TriggerSource: Send + Sync {
    /// Notices received since the previous poll.
    async fn poll(&self) -> anyhow::Result<Vec<TriggerNotice>>;
}

/// Names among `names` whose alarm subject is `subject`, i.e. subjects
/// ending in `"<name> : Alarme"`.
pub fn alarm_subject_names<'a, I>(subject: &str, names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let subject = subject.trim_end();
    names
        .into_iter()
        .filter(|name| is_matchable(name))
        .filter(|name| {
            subject
                .strip_suffix(ALARM_SUFFIX)
                .is_some_and(|head| head.ends_with(name))
        })
        .collect()
}

/// Empty and placeholder names never match a notice.
pub(crate) fn is_matchable(internal_name: &str) -> bool {
    !internal_name.is_empty() && internal_name != UNINITIALISED_NAME
}

// ---------------------------------------------------------------------------
// Queued source
// ---------------------------------------------------------------------------

/// Sending half of a [`QueuedTriggerSource`].
pub type TriggerFeed = mpsc::UnboundedSender<TriggerNotice>;

/// In-process source fed through a channel (the daemon's trigger webhook).
pub struct QueuedTriggerSource {
    rx: Mutex<mpsc::UnboundedReceiver<TriggerNotice>>,
}

impl QueuedTriggerSource {
    pub fn new() -> (Self, TriggerFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Mutex::new(rx) }, tx)
    }
}

#[async_trait]
impl TriggerSource for QueuedTriggerSource {
    async fn poll(&self) -> anyhow::Result<Vec<TriggerNotice>> {
        let mut rx = self.rx.lock().await;
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        Ok(out)
    }
}
