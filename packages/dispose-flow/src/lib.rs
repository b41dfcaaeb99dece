/*
 * dispose-flow - Resource Lifetime Dataflow Engine
 *
 * Feature-First Hexagonal Architecture:
 * - features/flow_graph      : CFG model, builder, structure analysis (RPO, loops, exception targets)
 * - features/points_to       : Abstract locations + may-alias dataflow
 * - features/dispose         : Dispose-state lattice, transfer functions, verdicts, ownership rules
 * - features/interprocedural : Bounded context-sensitive callee re-analysis
 * - features/fixpoint        : Worklist scheduler over reverse post-order
 * - api/                     : analyze_procedure / analyze_program entry points
 * - config/                  : Option parsing + YAML configuration
 *
 * Every procedure is analyzed by its own session; independent procedures run
 * on the rayon pool.
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Transfer helpers thread session + frame + state
#![allow(clippy::type_complexity)] // Lane/state maps
#![allow(clippy::module_inception)] // Module naming intentional
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::collapsible_if)] // Readability over brevity
#![allow(clippy::single_match)] // Single match for readability

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Error types
pub mod errors;

/// Analysis configuration (string options + YAML)
pub mod config;

/// Feature modules
pub mod features;

/// Public entry points
pub mod api;

pub use api::{
    analyze_procedure, analyze_program, AnalysisOutcome, CancellationToken, ProcedureAnalysis,
    ProcedureReport, ProgramReport, SkipReason,
};
pub use config::{AnalysisConfig, DisposeAnalysisKind, InterproceduralKind};
pub use errors::{DisposeFlowError, Result};
pub use features::dispose::domain::{Classification, DiagnosticKind, PathKind, Verdict};
pub use features::dispose::infrastructure::{OwnershipEffect, OwnershipRule, OwnershipRules};
pub use features::flow_graph::domain::*;
pub use features::flow_graph::infrastructure::{DisposableTypeSet, ProcedureBuilder};
pub use features::flow_graph::ports::DisposableTypes;
