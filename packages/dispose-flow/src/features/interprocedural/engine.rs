/*
 * Interprocedural Engine
 *
 * Bounded context-sensitive re-analysis of statically resolved callees.
 *
 * Algorithm:
 * 1. Cut-offs: interprocedural disabled, chain depth, recursion, budget,
 *    callee signature cannot carry a disposable (non-exception modes)
 * 2. Entry state: caller heap + dispose maps, parameters bound to the
 *    argument sets, `this` bound to the receiver set
 * 3. Fixpoint over the callee CFG in the extended context (memoized)
 * 4. Map back: caller symbols restored, callee heap/dispose effects kept,
 *    callee-created locations unreachable from the caller collected
 *
 * A cut-off returns `None`; the caller then applies the conservative
 * unresolved-call summary.
 */

use tracing::{debug, trace};

use super::summary::{CalleeExit, CalleeKey};
use crate::errors::{DisposeFlowError, Result};
use crate::features::dispose::application::{AnalysisSession, Frame};
use crate::features::dispose::domain::AnalysisState;
use crate::features::fixpoint::FixpointScheduler;
use crate::features::flow_graph::domain::{
    ArgumentMode, OperationRef, ParameterMode, Procedure, ProcedureId, SymbolId,
};
use crate::features::points_to::domain::{LocationId, PointsToSet};

/// Argument as seen by the callee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArgument {
    pub mode: ArgumentMode,
    /// Caller symbol written back by `ref`/`out`
    pub written: Option<SymbolId>,
    pub pts: PointsToSet,
}

/// One call to re-analyze
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub site: OperationRef,
    pub callee: ProcedureId,
    pub receiver: Option<PointsToSet>,
    pub arguments: Vec<CallArgument>,
}

/// Callee effect in caller terms
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    /// State after a normal return (`None`: callee never returns)
    pub normal: Option<AnalysisState>,
    /// State (already raised) when the callee throws
    pub exceptional: Option<AnalysisState>,
    /// Union of the callee's returned sets
    pub returned: PointsToSet,
    /// Final values of `ref`/`out` parameters
    pub written_back: Vec<(SymbolId, PointsToSet)>,
}

/// Interprocedural engine
pub struct InterproceduralEngine;

impl InterproceduralEngine {
    /// Analyze `request` from `frame` with the caller state `state`
    pub fn analyze_call<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        request: &CallRequest,
        state: &AnalysisState,
    ) -> Result<Option<CallOutcome>> {
        session.check_cancelled()?;

        if !session.config.interprocedural_enabled() {
            return Ok(None);
        }
        let program = session.program;
        let Some(callee) = program.procedure(request.callee) else {
            debug!("Callee {:?} not in program, using conservative summary", request.callee);
            return Ok(None);
        };
        if frame.context.is_circular(session.root, request.callee) {
            debug!(
                "Recursive call to '{}' cut at depth {}",
                callee.name.method_path(),
                frame.context.depth
            );
            return Ok(None);
        }
        if frame.context.depth >= session.config.max_call_chain {
            trace!(
                "Call chain limit {} reached at '{}'",
                session.config.max_call_chain,
                callee.name.method_path()
            );
            return Ok(None);
        }
        if !session.config.analysis_kind.tracks_exception_paths()
            && !Self::may_carry_disposable(session, callee)
        {
            trace!("Skipping '{}': signature carries no disposable", callee.name.method_path());
            return Ok(None);
        }

        let structure = match session.structure_for(request.callee, callee) {
            Ok(structure) => structure,
            Err(e @ DisposeFlowError::MalformedCfg { .. }) => {
                debug!("{}; using conservative summary", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let context = frame.context.with_call(request.site, request.callee);
        let entry = Self::entry_state(callee, request, state);
        let key = CalleeKey {
            callee: request.callee,
            context: context.clone(),
            entry: entry.clone(),
        };

        let exit = match session.calls.get(&key) {
            Some(exit) => {
                session.stats.memo_hits += 1;
                exit.clone()
            }
            None => {
                if !session
                    .calls
                    .try_begin_analysis(session.config.max_callee_analyses)
                {
                    debug!(
                        "Callee analysis budget ({}) spent, '{}' summarized conservatively",
                        session.config.max_callee_analyses,
                        callee.name.method_path()
                    );
                    return Ok(None);
                }
                session.stats.callee_analyses += 1;

                let callee_frame = Frame {
                    procedure_id: request.callee,
                    procedure: callee,
                    structure,
                    context,
                };
                let result = match FixpointScheduler::run(session, &callee_frame, entry) {
                    Ok(result) => result,
                    Err(e @ DisposeFlowError::NonConvergence { .. }) => {
                        debug!("{}; using conservative summary", e);
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };
                let exit = CalleeExit {
                    normal: result.exit,
                    exceptional: result.unhandled,
                };
                session.calls.put(key, exit.clone());
                exit
            }
        };

        Ok(Some(Self::map_back(session, frame, callee, request, state, exit)))
    }

    /// Whether any parameter or the return type may hold a disposable
    fn may_carry_disposable(session: &AnalysisSession<'_>, callee: &Procedure) -> bool {
        callee
            .parameters
            .iter()
            .any(|p| session.types.may_carry_disposable(&p.ty))
            || callee
                .return_type
                .as_ref()
                .map(|ty| session.types.may_carry_disposable(ty))
                .unwrap_or(false)
    }

    /// Callee entry state: caller heap and dispose maps, callee bindings
    fn entry_state(callee: &Procedure, request: &CallRequest, caller: &AnalysisState) -> AnalysisState {
        let mut entry = caller.clone();
        entry.points_to.clear_symbols();
        entry.points_to.take_returned();

        if let Some(this) = callee.this_symbol {
            let receiver = request.receiver.clone().unwrap_or_else(PointsToSet::unknown);
            entry.points_to.set(this, receiver);
        }
        for (index, param) in callee.parameters.iter().enumerate() {
            let pts = match (param.mode, request.arguments.get(index)) {
                // unassigned until the callee writes it
                (ParameterMode::Out, _) => PointsToSet::null(),
                (_, Some(argument)) => argument.pts.clone(),
                (_, None) => PointsToSet::unknown(),
            };
            entry.points_to.set(param.symbol, pts);
        }
        entry
    }

    fn map_back(
        session: &AnalysisSession<'_>,
        frame: &Frame<'_>,
        callee: &Procedure,
        request: &CallRequest,
        caller: &AnalysisState,
        exit: CalleeExit,
    ) -> CallOutcome {
        let mut outcome = CallOutcome::default();

        if let Some(normal) = exit.normal {
            let (state, returned, written_back) =
                Self::to_caller(session, frame, callee, request, caller, normal);
            outcome.normal = Some(state);
            outcome.returned = returned;
            outcome.written_back = written_back;
        }
        if let Some(exceptional) = exit.exceptional {
            let (state, _, _) = Self::to_caller(session, frame, callee, request, caller, exceptional);
            outcome.exceptional = Some(state);
        }
        outcome
    }

    fn to_caller(
        session: &AnalysisSession<'_>,
        frame: &Frame<'_>,
        callee: &Procedure,
        request: &CallRequest,
        caller: &AnalysisState,
        mut callee_state: AnalysisState,
    ) -> (AnalysisState, PointsToSet, Vec<(SymbolId, PointsToSet)>) {
        let returned = callee_state.points_to.take_returned();
        let written_back: Vec<(SymbolId, PointsToSet)> = request
            .arguments
            .iter()
            .zip(&callee.parameters)
            .filter_map(|(argument, param)| {
                let symbol = argument.written?;
                Some((symbol, callee_state.points_to.get(param.symbol).clone()))
            })
            .collect();

        let mut result = caller.clone();
        result.points_to.replace_heap(callee_state.points_to);
        result.dispose = callee_state.dispose;

        // Caller-visible roots
        let mut roots: Vec<LocationId> = result
            .points_to
            .symbols()
            .flat_map(|(_, pts)| pts.tracked())
            .collect();
        roots.extend(result.points_to.returned().tracked());
        roots.extend(returned.tracked());
        roots.extend(written_back.iter().flat_map(|(_, pts)| pts.tracked()));
        let reachable = result.points_to.reachable_from(roots);

        let depth = frame.context.depth;
        let dead = result
            .dispose
            .locations()
            .filter(|loc| !reachable.contains(loc))
            .filter(|loc| {
                session
                    .factory
                    .get(*loc)
                    .map(|l| l.is_deeper_than(depth))
                    .unwrap_or(false)
            })
            .collect();
        result.forget(&dead);

        (result, returned, written_back)
    }
}

