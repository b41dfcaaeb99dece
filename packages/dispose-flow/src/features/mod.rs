//! Feature modules - Each feature follows Hexagonal Architecture
//!
//! Each feature contains:
//! - domain/     - Pure analysis state (no external dependencies)
//! - ports/      - Interface definitions (traits)
//! - application/ - Transfer functions and collectors
//! - infrastructure/ - Builders, structure analysis, rule tables

pub mod flow_graph;

// Abstract locations + may-alias dataflow
pub mod points_to;

// Dispose-state lattice, transfer, verdicts
pub mod dispose;

// Bounded context-sensitive callee re-analysis
pub mod interprocedural;

// Worklist iteration over reverse post-order
pub mod fixpoint;
