use dhk_schemas::{GroupSet, SecurityState};

/// Map `{active groups, trigger flag}` to a [`SecurityState`].
///
/// Evaluated in order:
/// 1. triggered and at least one group armed => `Triggered`
/// 2. active ⊇ stay ∪ night => `AwayArmed`
/// 3. active ⊇ stay => `StayArmed`
/// 4. active ⊇ night => `NightArmed`
/// 5. otherwise => `Disarmed`
///
/// A trigger flag with no armed group is not reported: someone disarmed
/// after the fact.
pub fn reconcile(
    active: &GroupSet,
    triggered: bool,
    stay: &GroupSet,
    night: &GroupSet,
) -> SecurityState {
    if triggered && !active.is_empty() {
        return SecurityState::Triggered;
    }
    if active.is_superset(&stay.union(night)) {
        SecurityState::AwayArmed
    } else if active.is_superset(stay) {
        SecurityState::StayArmed
    } else if active.is_superset(night) {
        SecurityState::NightArmed
    } else {
        SecurityState::Disarmed
    }
}
