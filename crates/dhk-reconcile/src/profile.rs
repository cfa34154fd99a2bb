use dhk_schemas::{GroupSet, SecurityState, TargetState};
use serde::{Deserialize, Serialize};

use crate::reconcile;

/// Which zone groups make up the "stay" and "night" arming modes of one
/// installation. "Away" is always the union of both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmingProfile {
    pub stay_groups: GroupSet,
    pub night_groups: GroupSet,
}

impl Default for ArmingProfile {
    /// Stay = `{1}`, night = `{2}`.
    fn default() -> Self {
        Self {
            stay_groups: GroupSet::new([1]).unwrap_or_default(),
            night_groups: GroupSet::new([2]).unwrap_or_default(),
        }
    }
}

impl ArmingProfile {
    pub fn new(stay_groups: GroupSet, night_groups: GroupSet) -> Self {
        Self {
            stay_groups,
            night_groups,
        }
    }

    /// Groups to arm in order to reach `target`. `Disarmed` is the empty set.
    pub fn groups_for(&self, target: TargetState) -> GroupSet {
        match target {
            TargetState::StayArmed => self.stay_groups.clone(),
            TargetState::NightArmed => self.night_groups.clone(),
            TargetState::AwayArmed => self.stay_groups.union(&self.night_groups),
            TargetState::Disarmed => GroupSet::empty(),
        }
    }

    /// [`reconcile`] with this profile's groups.
    pub fn classify(&self, active: &GroupSet, triggered: bool) -> SecurityState {
        reconcile(active, triggered, &self.stay_groups, &self.night_groups)
    }
}
