//! Dispose dataflow state
//!
//! [`DisposeStateMap`] maps abstract locations to dispose values;
//! [`AnalysisState`] pairs it with the points-to state it is propagated over.
//! Both join by per-key union.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::dispose_value::DisposeValue;
use crate::features::points_to::domain::{LocationId, PointsToState};

/// Location → dispose value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisposeStateMap(BTreeMap<LocationId, DisposeValue>);

impl DisposeStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: LocationId) -> Option<&DisposeValue> {
        self.0.get(&location)
    }

    /// Strong reset of a location (allocation)
    pub fn set(&mut self, location: LocationId, value: DisposeValue) {
        self.0.insert(location, value);
    }

    pub fn dispose(&mut self, location: LocationId) {
        if let Some(value) = self.0.get_mut(&location) {
            value.dispose();
        }
    }

    pub fn escape(&mut self, location: LocationId) {
        if let Some(value) = self.0.get_mut(&location) {
            value.escape();
        }
    }

    pub fn remove(&mut self, location: LocationId) -> Option<DisposeValue> {
        self.0.remove(&location)
    }

    pub fn remove_all(&mut self, dead: &BTreeSet<LocationId>) {
        self.0.retain(|loc, _| !dead.contains(loc));
    }

    pub fn raise(&mut self) {
        for value in self.0.values_mut() {
            value.raise();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocationId, &DisposeValue)> {
        self.0.iter().map(|(l, v)| (*l, v))
    }

    pub fn locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Join; returns true if anything changed
    pub fn merge(&mut self, other: &DisposeStateMap) -> bool {
        let mut changed = false;
        for (loc, value) in &other.0 {
            match self.0.get_mut(loc) {
                Some(existing) => changed |= existing.merge(value),
                None => {
                    self.0.insert(*loc, *value);
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Combined state propagated by the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisState {
    pub points_to: PointsToState,
    pub dispose: DisposeStateMap,
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join; returns true if anything changed
    pub fn merge(&mut self, other: &AnalysisState) -> bool {
        let pts_changed = self.points_to.merge(&other.points_to);
        let dispose_changed = self.dispose.merge(&other.dispose);
        pts_changed || dispose_changed
    }

    /// Cross an exceptional edge
    pub fn raise(&mut self) {
        self.dispose.raise();
    }

    /// Escape every location reachable from `roots` through heap slots
    pub fn escape_reachable<I>(&mut self, roots: I)
    where
        I: IntoIterator<Item = LocationId>,
    {
        for loc in self.points_to.reachable_from(roots) {
            self.dispose.escape(loc);
        }
    }

    /// Drop locations from both maps
    pub fn forget(&mut self, dead: &BTreeSet<LocationId>) {
        self.points_to.remove_locations(dead);
        self.dispose.remove_all(dead);
    }

    /// Join two optional states
    pub fn join_into(target: &mut Option<AnalysisState>, state: AnalysisState) -> bool {
        match target {
            Some(existing) => existing.merge(&state),
            None => {
                *target = Some(state);
                true
            }
        }
    }
}
