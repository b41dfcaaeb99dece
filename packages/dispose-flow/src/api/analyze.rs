//! Analysis entry points
//!
//! [`analyze_procedure`] runs one top-level procedure in its own session.
//! [`analyze_program`] runs every procedure of a program, in parallel with
//! rayon when the `parallel` feature is enabled, isolating failures per
//! procedure.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::rc::Rc;
use tracing::{debug, info, warn};

use super::cancellation::CancellationToken;
use super::report::{AnalysisOutcome, ProcedureAnalysis, ProcedureReport, ProgramReport, SkipReason};
use crate::config::AnalysisConfig;
use crate::errors::{DisposeFlowError, Result};
use crate::features::dispose::application::{AnalysisSession, Frame, VerdictCollector};
use crate::features::dispose::domain::AnalysisState;
use crate::features::dispose::infrastructure::OwnershipEffect;
use crate::features::fixpoint::FixpointScheduler;
use crate::features::flow_graph::domain::{
    OperationKind, ParameterMode, Procedure, ProcedureId, Program,
};
use crate::features::flow_graph::infrastructure::CfgStructure;
use crate::features::flow_graph::ports::DisposableTypes;
use crate::features::points_to::domain::PointsToSet;

/// Analyze one procedure of `program`
///
/// # Errors
/// - `Cancelled` when `token` is cancelled
/// - `MalformedCfg` for dangling block/region references
/// - `NonConvergence` when the visit bound is exceeded
pub fn analyze_procedure(
    program: &Program,
    id: ProcedureId,
    config: &AnalysisConfig,
    types: &dyn DisposableTypes,
    token: &CancellationToken,
) -> Result<ProcedureAnalysis> {
    let procedure = program
        .procedure(id)
        .ok_or_else(|| DisposeFlowError::malformed(format!("#{}", id.0), "procedure not in program"))?;
    let name = procedure.name.method_path();

    if config.excluded_symbols.is_excluded(&procedure.name) {
        debug!("Skipping excluded '{}'", name);
        return Ok(ProcedureAnalysis::skipped(name, SkipReason::Excluded));
    }
    if !may_create_disposable(procedure, config, types) {
        debug!("Skipping '{}': no disposable creation", name);
        return Ok(ProcedureAnalysis::skipped(name, SkipReason::NoDisposableCreation));
    }
    token.check()?;

    debug!("Analyzing '{}' ({} blocks)", name, procedure.cfg.len());
    let structure = Rc::new(CfgStructure::analyze(procedure)?);
    let mut session = AnalysisSession::new(program, config, types, token.clone(), id, structure.clone());
    let frame = Frame::root(id, procedure, structure);

    let mut result = FixpointScheduler::run(&mut session, &frame, root_entry_state(procedure))?;
    for state in [result.exit.as_mut(), result.unhandled.as_mut()].into_iter().flatten() {
        escape_written_parameters(procedure, state);
    }

    let verdicts = VerdictCollector::new(&session.factory, procedure, config.analysis_kind).collect(
        result.exit.as_ref(),
        result.unhandled.as_ref(),
        &result.lost,
    );
    session.stats.locations = session.factory.count() as usize;

    debug!(
        "Finished '{}': {} verdicts, {} block visits, {} callee analyses",
        name,
        verdicts.len(),
        session.stats.block_visits,
        session.stats.callee_analyses
    );
    Ok(ProcedureAnalysis {
        procedure: name,
        verdicts,
        stats: session.stats,
        skipped: None,
    })
}

/// Analyze every procedure of `program`
///
/// Per-procedure failures are logged and reported, never propagated.
pub fn analyze_program(
    program: &Program,
    config: &AnalysisConfig,
    types: &dyn DisposableTypes,
    token: &CancellationToken,
) -> ProgramReport {
    info!("Analyzing {} procedures", program.len());
    let ids: Vec<ProcedureId> = program.iter().map(|(id, _)| id).collect();

    #[cfg(feature = "parallel")]
    let procedures: Vec<ProcedureReport> = ids
        .par_iter()
        .map(|id| report_for(program, *id, config, types, token))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let procedures: Vec<ProcedureReport> = ids
        .iter()
        .map(|id| report_for(program, *id, config, types, token))
        .collect();

    let report = ProgramReport { procedures };
    info!(
        "Analysis finished: {} verdicts, {} failed procedures",
        report.verdict_count(),
        report.failures().count()
    );
    report
}

fn report_for(
    program: &Program,
    id: ProcedureId,
    config: &AnalysisConfig,
    types: &dyn DisposableTypes,
    token: &CancellationToken,
) -> ProcedureReport {
    let procedure = program
        .procedure(id)
        .map(|p| p.name.method_path())
        .unwrap_or_default();

    let outcome = match analyze_procedure(program, id, config, types, token) {
        Ok(ProcedureAnalysis {
            skipped: Some(reason), ..
        }) => AnalysisOutcome::Skipped { reason },
        Ok(analysis) => AnalysisOutcome::Completed {
            verdicts: analysis.verdicts,
            stats: analysis.stats,
        },
        Err(e) if e.is_cancelled() => AnalysisOutcome::Cancelled,
        Err(e) => {
            warn!("Analysis of '{}' failed: {}", procedure, e);
            AnalysisOutcome::Failed { error: e.to_string() }
        }
    };
    ProcedureReport { id, procedure, outcome }
}

/// Parameters and `this` hold unknown caller values; `out` parameters start
/// unassigned
fn root_entry_state(procedure: &Procedure) -> AnalysisState {
    let mut state = AnalysisState::new();
    if let Some(this) = procedure.this_symbol {
        state.points_to.set(this, PointsToSet::unknown());
    }
    for param in &procedure.parameters {
        let pts = match param.mode {
            ParameterMode::Out => PointsToSet::null(),
            ParameterMode::Value | ParameterMode::Ref => PointsToSet::unknown(),
        };
        state.points_to.set(param.symbol, pts);
    }
    state
}

/// Values left in `ref`/`out` parameters belong to the caller
fn escape_written_parameters(procedure: &Procedure, state: &mut AnalysisState) {
    let roots: Vec<_> = procedure
        .parameters
        .iter()
        .filter(|p| p.mode != ParameterMode::Value)
        .flat_map(|p| state.points_to.get(p.symbol).tracked().collect::<Vec<_>>())
        .collect();
    state.escape_reachable(roots);
}

/// Whether any operation could create a tracked disposable instance
fn may_create_disposable(procedure: &Procedure, config: &AnalysisConfig, types: &dyn DisposableTypes) -> bool {
    procedure.cfg.operations().any(|op| match &op.kind {
        OperationKind::Allocation { ty, constructor, .. } => {
            types.is_disposable(ty)
                || (config.interprocedural_enabled()
                    && constructor.as_ref().and_then(|c| c.analyzable_target()).is_some())
        }
        OperationKind::Call { callee, .. } => match config.ownership_rules.effects_for(&callee.name) {
            Some(effects) => effects.iter().any(|e| {
                matches!(
                    e,
                    OwnershipEffect::ReturnsNewInstance | OwnershipEffect::OutArgumentNewInstance { .. }
                )
            }),
            None => config.interprocedural_enabled() && callee.analyzable_target().is_some(),
        },
        _ => false,
    })
}
