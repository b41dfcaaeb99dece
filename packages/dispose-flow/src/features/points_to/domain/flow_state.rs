//! Flow-Sensitive Points-To State
//!
//! Points-to facts at a program point:
//! - symbol → PointsToSet
//! - heap slot (location, field) → PointsToSet
//! - accumulated return-value set (callee analysis only)
//!
//! Ordered maps keep iteration (and therefore location numbering and verdict
//! order) deterministic, and make the state hashable for memo keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::abstract_location::LocationId;
use super::points_to_set::{PointsToSet, EMPTY_SET};
use crate::features::flow_graph::domain::SymbolId;

/// Field key of a heap slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    Named(String),
    /// Summary slot for every element of a collection
    Element,
    TupleItem(u32),
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Named(name) => f.write_str(name),
            FieldKey::Element => f.write_str("[]"),
            FieldKey::TupleItem(i) => write!(f, "Item{}", i + 1),
        }
    }
}

/// Heap slot `(location, field)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeapSlot {
    pub location: LocationId,
    pub field: FieldKey,
}

impl HeapSlot {
    pub fn new(location: LocationId, field: FieldKey) -> Self {
        Self { location, field }
    }
}

/// Points-to state at a program point
///
/// Join = per-key union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointsToState {
    symbols: BTreeMap<SymbolId, PointsToSet>,
    heap: BTreeMap<HeapSlot, PointsToSet>,
    returned: PointsToSet,
}

impl PointsToState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get points-to set for a symbol (empty if unbound)
    pub fn get(&self, symbol: SymbolId) -> &PointsToSet {
        self.symbols.get(&symbol).unwrap_or(&EMPTY_SET)
    }

    /// Strong update; returns the previous set
    pub fn set(&mut self, symbol: SymbolId, pts: PointsToSet) -> PointsToSet {
        self.symbols.insert(symbol, pts).unwrap_or_default()
    }

    pub fn slot(&self, location: LocationId, field: &FieldKey) -> Option<&PointsToSet> {
        self.heap.get(&HeapSlot::new(location, field.clone()))
    }

    /// Strong update of a heap slot; returns the previous set
    pub fn set_slot(&mut self, location: LocationId, field: FieldKey, pts: PointsToSet) -> PointsToSet {
        self.heap
            .insert(HeapSlot::new(location, field), pts)
            .unwrap_or_default()
    }

    /// Weak update of a heap slot
    pub fn add_to_slot(&mut self, location: LocationId, field: FieldKey, pts: &PointsToSet) {
        self.heap
            .entry(HeapSlot::new(location, field))
            .or_default()
            .union_with(pts);
    }

    pub fn returned(&self) -> &PointsToSet {
        &self.returned
    }

    pub fn add_returned(&mut self, pts: &PointsToSet) {
        self.returned.union_with(pts);
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &PointsToSet)> {
        self.symbols.iter().map(|(s, p)| (*s, p))
    }

    pub fn heap(&self) -> impl Iterator<Item = (&HeapSlot, &PointsToSet)> {
        self.heap.iter()
    }

    /// Locations stored in the heap slots of `location`
    pub fn contents_of(&self, location: LocationId) -> impl Iterator<Item = LocationId> + '_ {
        self.heap
            .range(HeapSlot::new(location, FieldKey::Named(String::new()))..)
            .take_while(move |(slot, _)| slot.location == location)
            .flat_map(|(_, pts)| pts.tracked())
    }

    /// Whether any symbol (other than `except`), heap slot of another
    /// location, or the return set still refers to `location`
    pub fn is_referenced(&self, location: LocationId, except: Option<SymbolId>) -> bool {
        self.symbols
            .iter()
            .any(|(s, pts)| Some(*s) != except && pts.contains(location))
            || self
                .heap
                .iter()
                .any(|(slot, pts)| slot.location != location && pts.contains(location))
            || self.returned.contains(location)
    }

    /// Transitive closure of `roots` through heap slots
    pub fn reachable_from<I>(&self, roots: I) -> BTreeSet<LocationId>
    where
        I: IntoIterator<Item = LocationId>,
    {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<LocationId> = roots.into_iter().collect();
        while let Some(loc) = stack.pop() {
            if seen.insert(loc) {
                stack.extend(self.contents_of(loc).filter(|l| !seen.contains(l)));
            }
        }
        seen
    }

    /// Forget every symbol binding (entering or leaving a callee)
    pub fn clear_symbols(&mut self) {
        self.symbols.clear();
    }

    pub fn take_returned(&mut self) -> PointsToSet {
        std::mem::take(&mut self.returned)
    }

    /// Take the heap of `other`, keeping this state's symbols and return set
    pub fn replace_heap(&mut self, other: PointsToState) {
        self.heap = other.heap;
    }

    /// Drop locations: their heap slots and every reference to them
    pub fn remove_locations(&mut self, dead: &BTreeSet<LocationId>) {
        if dead.is_empty() {
            return;
        }
        self.heap.retain(|slot, _| !dead.contains(&slot.location));
        for pts in self.heap.values_mut().chain(self.symbols.values_mut()) {
            for loc in dead {
                pts.remove(*loc);
            }
        }
        for loc in dead {
            self.returned.remove(*loc);
        }
    }

    /// Join (per-key union); returns true if anything changed
    pub fn merge(&mut self, other: &PointsToState) -> bool {
        let mut changed = false;
        for (symbol, pts) in &other.symbols {
            changed |= self.symbols.entry(*symbol).or_default().union_with(pts);
        }
        for (slot, pts) in &other.heap {
            changed |= self.heap.entry(slot.clone()).or_default().union_with(pts);
        }
        changed |= self.returned.union_with(&other.returned);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::points_to::domain::NULL_LOCATION;

    #[test]
    fn test_strong_update_returns_previous() {
        let mut state = PointsToState::new();
        let x = SymbolId(0);
        assert!(state.set(x, PointsToSet::singleton(1)).is_empty());
        let old = state.set(x, PointsToSet::null());
        assert_eq!(old, PointsToSet::singleton(1));
        assert!(state.get(x).contains(NULL_LOCATION));
    }

    #[test]
    fn test_merge_is_union() {
        let x = SymbolId(0);
        let mut a = PointsToState::new();
        a.set(x, PointsToSet::singleton(1));
        let mut b = PointsToState::new();
        b.set(x, PointsToSet::singleton(2));
        b.set_slot(5, FieldKey::Element, PointsToSet::singleton(1));

        assert!(a.merge(&b));
        assert!(!a.merge(&b));
        assert_eq!(a.get(x).len(), 2);
        assert_eq!(a.contents_of(5).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_reachability_and_references() {
        let mut state = PointsToState::new();
        let list = SymbolId(0);
        state.set(list, PointsToSet::singleton(1));
        state.set_slot(1, FieldKey::Element, PointsToSet::singleton(2));
        state.set_slot(2, FieldKey::Named("inner".into()), PointsToSet::singleton(3));

        let reach = state.reachable_from([1]);
        assert_eq!(reach.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(state.is_referenced(2, None));
        assert!(!state.is_referenced(1, Some(list)));

        let dead: BTreeSet<_> = [2].into_iter().collect();
        state.remove_locations(&dead);
        assert!(state.slot(1, &FieldKey::Element).unwrap().is_empty());
        assert!(state.slot(2, &FieldKey::Named("inner".into())).is_none());
    }
}
