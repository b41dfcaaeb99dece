//! Points-to transfer functions
//!
//! Pure updates of [`PointsToState`]. Location ids are supplied by the caller
//! (the dispose transfer owns the location factory and the escape decisions);
//! these functions only move sets around and report which locations lost a
//! holder so that lost references can be detected.

use std::collections::BTreeSet;

use crate::features::flow_graph::domain::{Operand, SymbolId};
use crate::features::points_to::domain::{
    FieldKey, LocationId, PointsToSet, PointsToState, UNKNOWN_LOCATION,
};

/// Result of refining a symbol on a null-check edge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullRefinement {
    /// Locations that were only reachable through the checked symbol
    /// (candidates for dropping from the null path)
    pub dropped: BTreeSet<LocationId>,
}

/// Points-to transfer functions
pub struct PointsToTransfer;

impl PointsToTransfer {
    /// Points-to set of an operand
    pub fn evaluate(state: &PointsToState, operand: &Operand) -> PointsToSet {
        match operand {
            Operand::Symbol(s) => state.get(*s).clone(),
            Operand::Null => PointsToSet::null(),
            Operand::Unknown => PointsToSet::unknown(),
        }
    }

    /// Union of several operands (`a ?? b`, conditional)
    pub fn evaluate_all<'a, I>(state: &PointsToState, operands: I) -> PointsToSet
    where
        I: IntoIterator<Item = &'a Operand>,
    {
        let mut result = PointsToSet::empty();
        for operand in operands {
            result.union_with(&Self::evaluate(state, operand));
        }
        result
    }

    /// `target = pts` (strong update). Returns the tracked locations that
    /// `target` held before and no longer holds.
    pub fn assign(state: &mut PointsToState, target: SymbolId, pts: PointsToSet) -> Vec<LocationId> {
        let new = pts.clone();
        let old = state.set(target, pts);
        old.tracked().filter(|l| !new.contains(*l)).collect()
    }

    /// Store `value` into `field` of every tracked receiver location.
    ///
    /// Strong update only when the receiver set is a single tracked location;
    /// returns the tracked locations overwritten by a strong update.
    pub fn write_slot(
        state: &mut PointsToState,
        receivers: &PointsToSet,
        field: FieldKey,
        value: &PointsToSet,
    ) -> Vec<LocationId> {
        if let Some(receiver) = receivers.as_singleton_tracked() {
            let old = state.set_slot(receiver, field, value.clone());
            return old.tracked().filter(|l| !value.contains(*l)).collect();
        }
        for receiver in receivers.tracked() {
            state.add_to_slot(receiver, field.clone(), value);
        }
        Vec::new()
    }

    /// Weak update regardless of the receiver set (collection inserts)
    pub fn add_to_slot(state: &mut PointsToState, receivers: &PointsToSet, field: FieldKey, value: &PointsToSet) {
        for receiver in receivers.tracked() {
            state.add_to_slot(receiver, field.clone(), value);
        }
    }

    /// Union of the receivers' slots; `Unknown` when the receiver may be
    /// unknown, is unbound, or a slot was never written
    pub fn read_slot(state: &PointsToState, receivers: &PointsToSet, field: &FieldKey) -> PointsToSet {
        let mut result = PointsToSet::empty();
        if receivers.is_empty() || receivers.may_be_unknown() {
            result.insert(UNKNOWN_LOCATION);
        }
        for receiver in receivers.tracked() {
            match state.slot(receiver, field) {
                Some(pts) => {
                    result.union_with(pts);
                }
                None => {
                    result.insert(UNKNOWN_LOCATION);
                }
            }
        }
        result
    }

    /// Refine `symbol` on a null-check edge.
    ///
    /// `None` when the edge is infeasible. Unbound symbols are not refined.
    pub fn refine_null(state: &mut PointsToState, symbol: SymbolId, is_null: bool) -> Option<NullRefinement> {
        let pts = state.get(symbol).clone();
        if pts.is_empty() {
            return Some(NullRefinement::default());
        }
        if is_null {
            if !pts.may_be_null() && !pts.may_be_unknown() {
                return None;
            }
            let dropped = pts
                .tracked()
                .filter(|l| !state.is_referenced(*l, Some(symbol)))
                .collect();
            state.set(symbol, PointsToSet::null());
            Some(NullRefinement { dropped })
        } else {
            let refined = pts.without_null();
            if refined.is_empty() {
                return None;
            }
            state.set(symbol, refined);
            Some(NullRefinement::default())
        }
    }
}
