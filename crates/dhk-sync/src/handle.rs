use std::fmt;
use std::sync::Arc;

use dhk_remote::SessionError;
use dhk_schemas::{InstallationStatus, SecurityState, TargetState};
use tokio::sync::watch;

use crate::Account;

/// Accessory-facing view of one installation.
///
/// Reads never touch the network or wait on the account gate; they return
/// the snapshot published after the last gated step.
#[derive(Clone)]
pub struct InstallationHandle {
    system_id: i64,
    account: Arc<Account>,
    status: watch::Receiver<InstallationStatus>,
}

impl fmt::Debug for InstallationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationHandle")
            .field("system_id", &self.system_id)
            .field("account", &self.account.login())
            .finish()
    }
}

impl InstallationHandle {
    pub(crate) fn new(
        system_id: i64,
        account: Arc<Account>,
        status: watch::Receiver<InstallationStatus>,
    ) -> Self {
        Self {
            system_id,
            account,
            status,
        }
    }

    pub fn system_id(&self) -> i64 {
        self.system_id
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn status(&self) -> InstallationStatus {
        self.status.borrow().clone()
    }

    pub fn security_state(&self) -> SecurityState {
        self.status.borrow().security_state
    }

    pub fn status_fault(&self) -> bool {
        self.status.borrow().status_fault
    }

    /// Raw trigger flag, set even while no group is armed.
    pub fn is_triggered(&self) -> bool {
        self.status.borrow().triggered
    }

    pub fn target_state(&self) -> TargetState {
        self.status.borrow().target_state
    }

    /// Run the command path for `target` and wait for it to finish.
    pub async fn request_state(&self, target: TargetState) -> Result<SecurityState, SessionError> {
        self.account.change_state(self.system_id, target).await
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<InstallationStatus> {
        self.status.clone()
    }
}
