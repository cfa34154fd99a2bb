//! Periodic synchronisation loop.
//!
//! ```text
//! initialise every account (once)
//! tick = 0
//! while running:
//!     poll every account (accounts in parallel, each under its own gate)
//!     if tick % multiplier == multiplier - 1:
//!         check triggers for every account
//!     tick += 1
//!     sleep P (woken early by stop)
//! ```
//!
//! # Invariants
//! - A failing account never aborts the cycle of another account.
//! - `stop` never interrupts a cycle in progress; the loop exits at the
//!   next continuation check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dhk_config::SchedulerSettings;
use futures_util::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::AccountRegistry;

pub struct SyncScheduler {
    registry: Arc<AccountRegistry>,
    interval: Duration,
    multiplier: u32,
    running: AtomicBool,
    wake: Notify,
}

impl SyncScheduler {
    pub fn new(registry: Arc<AccountRegistry>, settings: &SchedulerSettings) -> Self {
        Self::with_timing(registry, settings.update_interval(), settings.trigger_multiplier)
    }

    pub fn with_timing(registry: Arc<AccountRegistry>, interval: Duration, multiplier: u32) -> Self {
        Self {
            registry,
            interval,
            multiplier: multiplier.max(1),
            running: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = this.interval.as_secs(),
                multiplier = this.multiplier,
                accounts = this.registry.accounts().len(),
                "sync scheduler started"
            );
            this.initialize_all().await;
            let mut tick: u64 = 0;
            while this.is_running() {
                this.poll_all().await;
                if this.trigger_due(tick) {
                    this.check_triggers_all().await;
                }
                tick = tick.wrapping_add(1);
                if !this.is_running() {
                    break;
                }
                this.sleep_or_stop().await;
            }
            info!("sync scheduler stopped");
        })
    }

    /// Triggers run on the last poll of every `multiplier` polls.
    fn trigger_due(&self, tick: u64) -> bool {
        let m = u64::from(self.multiplier);
        tick % m == m - 1
    }

    /// Clear the continuation flag and wake the sleeper.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // notify_one keeps a permit if the loop is not sleeping yet.
        self.wake.notify_one();
    }

    /// One poll pass and one trigger pass, without sleeping.
    pub async fn run_once(&self) {
        self.poll_all().await;
        self.check_triggers_all().await;
    }

    pub async fn initialize_all(&self) {
        let accounts = self.registry.accounts();
        let results = join_all(accounts.iter().map(|a| a.initialize())).await;
        for (account, result) in accounts.iter().zip(results) {
            if let Err(e) = result {
                account.report_failure("initialize", &e);
            }
        }
    }

    pub async fn poll_all(&self) {
        let accounts = self.registry.accounts();
        let results = join_all(accounts.iter().map(|a| a.poll_cycle())).await;
        for (account, result) in accounts.iter().zip(results) {
            if let Err(e) = result {
                account.report_failure("poll_cycle", &e);
            }
        }
    }

    pub async fn check_triggers_all(&self) {
        for account in self.registry.accounts() {
            if let Err(e) = account.check_triggers().await {
                error!(account = %account.login(), error = %e, "trigger check failed");
            }
        }
    }

    async fn sleep_or_stop(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => {}
            _ = self.wake.notified() => {}
        }
    }
}
