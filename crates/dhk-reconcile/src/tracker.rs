use dhk_schemas::{SecurityState, TargetState};

/// Remembers the target an accessory asked for until the reconciled state
/// reaches it.
///
/// While a request is pending the accessory keeps seeing the requested
/// target; once the installation reports that state the request is
/// forgotten and the target follows the current state again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTracker {
    pending: Option<TargetState>,
    last: TargetState,
}

impl Default for TargetTracker {
    fn default() -> Self {
        Self {
            pending: None,
            last: TargetState::Disarmed,
        }
    }
}

impl TargetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user request.
    pub fn request(&mut self, target: TargetState) {
        self.pending = Some(target);
        self.last = target;
    }

    pub fn pending(&self) -> Option<TargetState> {
        self.pending
    }

    /// Feed a freshly reconciled state. Clears the pending request once it
    /// has been reached.
    pub fn observe(&mut self, current: SecurityState) {
        match self.pending {
            Some(p) if p.as_security_state() == current => {
                self.pending = None;
                self.last = p;
            }
            Some(_) => {}
            None => {
                if let Some(t) = current.as_target() {
                    self.last = t;
                }
            }
        }
    }

    /// Target the accessory should display for `current`.
    ///
    /// `Triggered` has no target of its own and keeps the last one.
    pub fn reported_target(&self, current: SecurityState) -> TargetState {
        if let Some(p) = self.pending {
            return p;
        }
        current.as_target().unwrap_or(self.last)
    }
}
