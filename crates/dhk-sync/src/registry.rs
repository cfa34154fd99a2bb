//! Explicit account registry, built once from configuration and owned by
//! the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dhk_config::{BridgeConfig, SchedulerSettings};
use dhk_reconcile::ArmingProfile;
use dhk_remote::{Installation, RetryPolicy, Transport};
use tokio::sync::broadcast;
use tracing::info;

use crate::trigger::{QueuedTriggerSource, TriggerFeed, TriggerNotice};
use crate::{Account, AccountSettings, Credential, InstallationHandle, SyncEvent};

const EVENT_CAPACITY: usize = 256;

pub struct AccountRegistry {
    accounts: Vec<Arc<Account>>,
    feeds: Vec<TriggerFeed>,
    events: broadcast::Sender<SyncEvent>,
}

impl AccountRegistry {
    pub fn new(accounts: Vec<Arc<Account>>, events: broadcast::Sender<SyncEvent>) -> Self {
        Self {
            accounts,
            feeds: Vec::new(),
            events,
        }
    }

    /// An event bus sized for the registry's observers.
    pub fn event_bus() -> broadcast::Sender<SyncEvent> {
        broadcast::channel(EVENT_CAPACITY).0
    }

    /// One account per distinct (login, password) pair; systems sharing a
    /// credential share the account and its gate.
    pub fn from_config(config: &BridgeConfig, transport: Arc<dyn Transport>) -> Self {
        let events = Self::event_bus();
        let settings = account_settings(&config.scheduler);

        let mut grouped: BTreeMap<Credential, (Vec<Installation>, bool)> = BTreeMap::new();
        for sys in &config.systems {
            let entry = grouped
                .entry(Credential::new(&sys.login, &sys.password))
                .or_default();
            entry.0.push(Installation::new(
                sys.system_id,
                &sys.transmitter_id,
                &sys.central_id,
                sys.master_code,
                &sys.name,
                ArmingProfile::new(sys.stay_groups.clone(), sys.night_groups.clone()),
            ));
            entry.1 |= sys.trigger_feed;
        }

        let mut accounts = Vec::with_capacity(grouped.len());
        let mut feeds = Vec::new();
        for (credential, (installations, trigger_feed)) in grouped {
            info!(
                account = %credential.login,
                installations = installations.len(),
                trigger_feed,
                "account registered"
            );
            let mut account = Account::new(
                credential,
                Arc::clone(&transport),
                installations,
                settings.clone(),
                events.clone(),
            );
            if trigger_feed {
                let (source, feed) = QueuedTriggerSource::new();
                account = account.with_trigger_source(Arc::new(source));
                feeds.push(feed);
            }
            accounts.push(Arc::new(account));
        }

        Self {
            accounts,
            feeds,
            events,
        }
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn installation(&self, system_id: i64) -> Option<InstallationHandle> {
        self.accounts.iter().find_map(|a| a.handle(system_id))
    }

    pub fn installations(&self) -> Vec<InstallationHandle> {
        self.accounts.iter().flat_map(|a| a.handles()).collect()
    }

    pub fn events(&self) -> &broadcast::Sender<SyncEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Apply an alarm subject line to every account now. Returns the number
    /// of installations marked triggered.
    pub async fn on_trigger_subject(&self, subject: &str, when: DateTime<Utc>) -> usize {
        let mut marked = 0;
        for a in &self.accounts {
            marked += a.on_trigger_subject(subject, when).await;
        }
        marked
    }

    /// Mark every installation, across all accounts, whose internal name
    /// matches `internal_name`. Returns the number marked.
    pub async fn on_trigger_detected(&self, internal_name: &str, when: DateTime<Utc>) -> usize {
        let mut marked = 0;
        for a in &self.accounts {
            marked += a.on_trigger_detected(internal_name, when).await;
        }
        marked
    }

    /// Queue a notice for every account with a trigger feed; it is applied
    /// on the next trigger check. Returns the number of feeds reached.
    pub fn queue_trigger(&self, notice: TriggerNotice) -> usize {
        self.feeds
            .iter()
            .filter(|feed| feed.send(notice.clone()).is_ok())
            .count()
    }

    pub fn has_trigger_feeds(&self) -> bool {
        !self.feeds.is_empty()
    }
}

pub fn account_settings(s: &SchedulerSettings) -> AccountSettings {
    AccountSettings {
        policy: RetryPolicy {
            max_attempts: s.max_request_tries,
            base_delay: s.retry_delay(),
            jitter: s.retry_jitter(),
        },
        cooldown: s.cooldown(),
    }
}
