//! Ports for the flow graph feature
//!
//! The engine never inspects a type hierarchy itself; the host answers
//! capability questions through this trait.

use crate::features::flow_graph::domain::TypeName;

/// Disposable-type capability provider
///
/// Implementations must be shareable across the rayon pool.
pub trait DisposableTypes: Send + Sync {
    /// Whether instances of `ty` must be released
    fn is_disposable(&self, ty: &TypeName) -> bool;

    /// Whether a parameter or return value of type `ty` can carry a disposable
    /// instance (the type itself, a supertype such as `object`, or a delegate).
    ///
    /// Used to skip callee re-analysis when nothing disposable can flow through.
    fn may_carry_disposable(&self, ty: &TypeName) -> bool {
        self.is_disposable(ty)
    }
}

impl<T: DisposableTypes + ?Sized> DisposableTypes for &T {
    fn is_disposable(&self, ty: &TypeName) -> bool {
        (**self).is_disposable(ty)
    }

    fn may_carry_disposable(&self, ty: &TypeName) -> bool {
        (**self).may_carry_disposable(ty)
    }
}
