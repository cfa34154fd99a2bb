//! Zone-group sets.
//!
//! An installation exposes at most four arming zones ("groups"), numbered
//! 1 to 4. Every set handled by the bridge is a subset of `{1, 2, 3, 4}`;
//! `GroupSet` enforces that at construction so no caller has to re-check it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest zone-group id accepted by the remote service.
pub const MIN_GROUP: u8 = 1;
/// Highest zone-group id accepted by the remote service.
pub const MAX_GROUP: u8 = 4;
/// Number of zone groups on every installation.
pub const GROUP_COUNT: usize = 4;

/// Ordered set of zone-group ids, always a subset of `{1, 2, 3, 4}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct GroupSet(BTreeSet<u8>);

/// A group id outside `1..=4` was supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidGroup(pub i64);

impl fmt::Display for InvalidGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid zone group {} (expected {}..={})",
            self.0, MIN_GROUP, MAX_GROUP
        )
    }
}

impl std::error::Error for InvalidGroup {}

impl GroupSet {
    /// The empty set (fully disarmed).
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// All four groups.
    pub fn all() -> Self {
        Self((MIN_GROUP..=MAX_GROUP).collect())
    }

    /// Build a set, rejecting any id outside `1..=4`.
    pub fn new<I>(ids: I) -> Result<Self, InvalidGroup>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut out = BTreeSet::new();
        for id in ids {
            out.insert(checked_group(id)?);
        }
        Ok(Self(out))
    }

    /// Build a set from a server response, dropping out-of-range ids.
    ///
    /// Returns the set and the ids that were dropped so the caller can log them.
    pub fn from_wire(ids: &[i64]) -> (Self, Vec<i64>) {
        let mut out = BTreeSet::new();
        let mut dropped = Vec::new();
        for &id in ids {
            match checked_group(id) {
                Ok(g) => {
                    out.insert(g);
                }
                Err(_) => dropped.push(id),
            }
        }
        (Self(out), dropped)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, group: u8) -> bool {
        self.0.contains(&group)
    }

    /// `true` when every group of the installation is present.
    pub fn is_all(&self) -> bool {
        self.0.len() == GROUP_COUNT
    }

    /// `self ⊇ other`. Every set is a superset of the empty set.
    pub fn is_superset(&self, other: &GroupSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn union(&self, other: &GroupSet) -> GroupSet {
        GroupSet(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Ids in ascending order, as the remote service expects them.
    pub fn to_wire(&self) -> Vec<i64> {
        self.0.iter().map(|&g| i64::from(g)).collect()
    }
}

fn checked_group(id: i64) -> Result<u8, InvalidGroup> {
    if (i64::from(MIN_GROUP)..=i64::from(MAX_GROUP)).contains(&id) {
        Ok(id as u8)
    } else {
        Err(InvalidGroup(id))
    }
}

impl TryFrom<Vec<u8>> for GroupSet {
    type Error = InvalidGroup;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        GroupSet::new(value.into_iter().map(i64::from))
    }
}

impl From<GroupSet> for Vec<u8> {
    fn from(value: GroupSet) -> Self {
        value.0.into_iter().collect()
    }
}

impl fmt::Display for GroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|g| g.to_string()).collect();
        write!(f, "{{{}}}", ids.join(","))
    }
}
