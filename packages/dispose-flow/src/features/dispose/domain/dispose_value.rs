/*
 * Dispose Value Lattice
 *
 * Per abstract location, two outcome sets:
 * - normal:      paths on which no exception was raised since the allocation
 * - exceptional: paths on which an exception was raised after the allocation
 *
 * Each outcome set ⊆ {Open, Disposed, Escaped}; join is union.
 *
 * Lattice view of one outcome set:
 *   Unknown (∅) ⊑ NotDisposed ({Open}) / Disposed ({Disposed,...}) ⊑ MaybeDisposed (Open + discharge)
 *   Escaped is an orthogonal tag: some path escaped the location.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Set of path outcomes (bit set)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outcomes(u8);

impl Outcomes {
    pub const NONE: Outcomes = Outcomes(0);
    pub const OPEN: Outcomes = Outcomes(1);
    pub const DISPOSED: Outcomes = Outcomes(2);
    pub const ESCAPED: Outcomes = Outcomes(4);

    #[inline]
    pub fn contains(self, other: Outcomes) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: Outcomes) -> Outcomes {
        Outcomes(self.0 | other.0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_open(self) -> bool {
        self.contains(Self::OPEN)
    }

    /// Some path released or handed off the resource
    #[inline]
    pub fn is_discharged(self) -> bool {
        self.0 & (Self::DISPOSED.0 | Self::ESCAPED.0) != 0
    }

    /// Every open path is discharged by `with`
    #[inline]
    pub fn discharge(self, with: Outcomes) -> Outcomes {
        if self.is_open() {
            Outcomes((self.0 & !Self::OPEN.0) | with.0)
        } else {
            self
        }
    }
}

/// Dispose state of one outcome set, in lattice terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisposeState {
    Unknown,
    NotDisposed,
    /// Open on some paths, discharged on others
    MaybeDisposed,
    Disposed,
    /// Discharged only by escaping
    Escaped,
}

impl DisposeState {
    pub fn of(outcomes: Outcomes) -> Self {
        if outcomes.is_empty() {
            DisposeState::Unknown
        } else if outcomes.is_open() {
            if outcomes.is_discharged() {
                DisposeState::MaybeDisposed
            } else {
                DisposeState::NotDisposed
            }
        } else if outcomes.contains(Outcomes::DISPOSED) {
            DisposeState::Disposed
        } else {
            DisposeState::Escaped
        }
    }
}

impl fmt::Display for DisposeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposeState::Unknown => write!(f, "Unknown"),
            DisposeState::NotDisposed => write!(f, "NotDisposed"),
            DisposeState::MaybeDisposed => write!(f, "MaybeDisposed"),
            DisposeState::Disposed => write!(f, "Disposed"),
            DisposeState::Escaped => write!(f, "Escaped"),
        }
    }
}

/// Dispose value of one abstract location
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisposeValue {
    pub normal: Outcomes,
    pub exceptional: Outcomes,
}

impl DisposeValue {
    /// Fresh instance (allocation strong-resets the location)
    pub fn allocated() -> Self {
        Self {
            normal: Outcomes::OPEN,
            exceptional: Outcomes::NONE,
        }
    }

    /// Join (union); returns true if `self` grew
    pub fn merge(&mut self, other: &DisposeValue) -> bool {
        let before = *self;
        self.normal = self.normal.union(other.normal);
        self.exceptional = self.exceptional.union(other.exceptional);
        *self != before
    }

    pub fn dispose(&mut self) {
        self.normal = self.normal.discharge(Outcomes::DISPOSED);
        self.exceptional = self.exceptional.discharge(Outcomes::DISPOSED);
    }

    pub fn escape(&mut self) {
        self.normal = self.normal.discharge(Outcomes::ESCAPED);
        self.exceptional = self.exceptional.discharge(Outcomes::ESCAPED);
    }

    /// Cross an exceptional edge: normal-path outcomes become exception-path outcomes
    pub fn raise(&mut self) {
        self.exceptional = self.exceptional.union(self.normal);
        self.normal = Outcomes::NONE;
    }

    /// Open on some path (either class)
    pub fn is_open(&self) -> bool {
        self.normal.is_open() || self.exceptional.is_open()
    }

    /// Some path escaped the location
    pub fn is_escaped(&self) -> bool {
        self.normal.contains(Outcomes::ESCAPED) || self.exceptional.contains(Outcomes::ESCAPED)
    }

    /// Combined lattice view of both classes
    pub fn state(&self) -> DisposeState {
        DisposeState::of(self.normal.union(self.exceptional))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_disposed_and_open_is_maybe() {
        let mut a = DisposeValue::allocated();
        let mut b = DisposeValue::allocated();
        b.dispose();
        assert_eq!(b.state(), DisposeState::Disposed);
        assert!(a.merge(&b));
        assert_eq!(a.state(), DisposeState::MaybeDisposed);
        assert!(!a.merge(&b));
    }

    #[test]
    fn test_escape_and_dispose_needs_no_report() {
        let mut a = DisposeValue::allocated();
        a.escape();
        let mut b = DisposeValue::allocated();
        b.dispose();
        a.merge(&b);
        assert!(!a.is_open());
        assert!(a.is_escaped());
    }

    #[test]
    fn test_raise_moves_normal_outcomes() {
        let mut v = DisposeValue::allocated();
        v.raise();
        assert_eq!(v.normal, Outcomes::NONE);
        assert!(v.exceptional.is_open());
        v.dispose();
        assert_eq!(DisposeState::of(v.exceptional), DisposeState::Disposed);
        // raising twice is idempotent
        let before = v;
        v.raise();
        assert_eq!(v, before);
    }

    #[test]
    fn test_dispose_after_dispose_is_stable() {
        let mut v = DisposeValue::allocated();
        v.dispose();
        v.dispose();
        assert_eq!(v.normal, Outcomes::DISPOSED);
        assert_eq!(DisposeState::of(Outcomes::NONE), DisposeState::Unknown);
    }
}
