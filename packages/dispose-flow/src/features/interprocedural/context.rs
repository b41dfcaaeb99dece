//! Call Context for Context-Sensitive Analysis
//!
//! Tracks the chain of call sites from the analyzed procedure down to the
//! callee currently being re-analyzed. Abstract locations are keyed by
//! (creation operation, context), so the same allocation inside a helper
//! yields distinct locations for distinct call chains.

use serde::{Deserialize, Serialize};

use crate::features::flow_graph::domain::{OperationRef, ProcedureId};

/// Call context for context-sensitive analysis
///
/// Tracks:
/// - Call stack (call-site operations, outermost first)
/// - Active procedures (for recursion cut)
/// - Call depth (chain length)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallContext {
    /// Call-site operations, outermost first
    pub call_stack: Vec<OperationRef>,

    /// Callee entered at each call site (parallel to `call_stack`)
    pub callees: Vec<ProcedureId>,

    /// Call depth (for chain limiting)
    pub depth: usize,
}

impl CallContext {
    /// Context of the analyzed (top-level) procedure
    pub fn root() -> Self {
        Self::default()
    }

    /// Create context with additional call
    pub fn with_call(&self, call_site: OperationRef, callee: ProcedureId) -> Self {
        let mut ctx = self.clone();
        ctx.call_stack.push(call_site);
        ctx.callees.push(callee);
        ctx.depth += 1;
        ctx
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Check if procedure is already active (circular call detection)
    pub fn is_circular(&self, root: ProcedureId, callee: ProcedureId) -> bool {
        callee == root || self.callees.contains(&callee)
    }

    /// Call site in the analyzed procedure at the top of this chain
    pub fn top_site(&self) -> Option<OperationRef> {
        self.call_stack.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(p: u32, op: u32) -> OperationRef {
        OperationRef::new(ProcedureId(p), op)
    }

    #[test]
    fn test_with_call_extends_chain() {
        let root = CallContext::root();
        let one = root.with_call(site(0, 4), ProcedureId(1));
        let two = one.with_call(site(1, 2), ProcedureId(2));

        assert!(root.is_root());
        assert_eq!(two.depth, 2);
        assert_eq!(two.top_site(), Some(site(0, 4)));
        assert!(two.is_circular(ProcedureId(0), ProcedureId(1)));
        assert!(two.is_circular(ProcedureId(0), ProcedureId(0)));
        assert!(!two.is_circular(ProcedureId(0), ProcedureId(3)));
    }

    #[test]
    fn test_equality_requires_same_chain() {
        let a = CallContext::root().with_call(site(0, 1), ProcedureId(1));
        let b = CallContext::root().with_call(site(0, 2), ProcedureId(1));
        assert_ne!(a, b);
        assert_eq!(a, CallContext::root().with_call(site(0, 1), ProcedureId(1)));
    }
}
