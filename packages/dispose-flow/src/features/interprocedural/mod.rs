//! Interprocedural analysis
//!
//! - context: call-chain contexts (location identity, recursion cut)
//! - summary: memoized callee exits
//! - engine: callee re-analysis and mapping back to the caller

mod context;
mod engine;
mod summary;

pub use context::CallContext;
pub use engine::{CallArgument, CallOutcome, CallRequest, InterproceduralEngine};
pub use summary::{CallOutcomeCache, CalleeExit, CalleeKey};
