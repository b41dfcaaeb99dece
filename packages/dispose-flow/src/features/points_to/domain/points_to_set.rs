//! Points-to sets
//!
//! Ordered set of location ids. `Null` and `Unknown` are ordinary members
//! with reserved ids, so joins never special-case them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::abstract_location::{LocationId, NULL_LOCATION, UNKNOWN_LOCATION};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointsToSet(BTreeSet<LocationId>);

/// Shared empty set for lookups of unbound keys
pub(crate) static EMPTY_SET: PointsToSet = PointsToSet(BTreeSet::new());

impl PointsToSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn singleton(id: LocationId) -> Self {
        let mut set = BTreeSet::new();
        set.insert(id);
        Self(set)
    }

    pub fn null() -> Self {
        Self::singleton(NULL_LOCATION)
    }

    pub fn unknown() -> Self {
        Self::singleton(UNKNOWN_LOCATION)
    }

    pub fn insert(&mut self, id: LocationId) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: LocationId) -> bool {
        self.0.remove(&id)
    }

    /// Union in place; returns true if the set grew
    pub fn union_with(&mut self, other: &PointsToSet) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }

    pub fn union(&self, other: &PointsToSet) -> PointsToSet {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    #[inline]
    pub fn contains(&self, id: LocationId) -> bool {
        self.0.contains(&id)
    }

    #[inline]
    pub fn may_be_null(&self) -> bool {
        self.contains(NULL_LOCATION)
    }

    #[inline]
    pub fn may_be_unknown(&self) -> bool {
        self.contains(UNKNOWN_LOCATION)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.0.iter().copied()
    }

    /// Members that are neither `Null` nor `Unknown`
    pub fn tracked(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.0
            .iter()
            .copied()
            .filter(|id| *id != NULL_LOCATION && *id != UNKNOWN_LOCATION)
    }

    /// The only member when it is a single tracked location
    pub fn as_singleton_tracked(&self) -> Option<LocationId> {
        match self.0.len() {
            1 => self.tracked().next(),
            _ => None,
        }
    }

    pub fn without_null(&self) -> PointsToSet {
        let mut result = self.clone();
        result.remove(NULL_LOCATION);
        result
    }

    /// Members of `self` missing from `other`
    pub fn difference(&self, other: &PointsToSet) -> Vec<LocationId> {
        self.0.difference(&other.0).copied().collect()
    }
}

impl FromIterator<LocationId> for PointsToSet {
    fn from_iter<I: IntoIterator<Item = LocationId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_reports_growth() {
        let mut a = PointsToSet::singleton(1);
        assert!(a.union_with(&PointsToSet::null()));
        assert!(!a.union_with(&PointsToSet::singleton(1)));
        assert!(a.may_be_null());
        assert_eq!(a.tracked().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_singleton_tracked() {
        assert_eq!(PointsToSet::singleton(4).as_singleton_tracked(), Some(4));
        assert_eq!(PointsToSet::unknown().as_singleton_tracked(), None);
        let two: PointsToSet = [1, 2].into_iter().collect();
        assert_eq!(two.as_singleton_tracked(), None);
        assert_eq!(two.difference(&PointsToSet::singleton(2)), vec![1]);
    }
}
