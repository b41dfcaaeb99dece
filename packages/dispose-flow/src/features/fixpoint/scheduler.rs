/*
 * Worklist Fixpoint Scheduler
 *
 * Kildall-style worklist over basic blocks, ordered by reverse post-order.
 *
 * Algorithm:
 * 1. Entry state of the entry block in the normal lane
 * 2. Pop the (rank, block, lane) with the lowest RPO rank
 *    a. Transfer the block (normal + exceptional outputs)
 *    b. Route outputs along normal edges (with null-check refinement) and
 *       to the block's exception targets
 *    c. Join into the target lane entry; re-enqueue when it grew
 * 3. Replay every stable entry once to collect the normal exit, the
 *    unhandled-exception sink and lost references
 *
 * Lanes:
 * - Normal: ordinary flow
 * - Rethrow(f): flow that entered finally `f` exceptionally; when it leaves
 *   `f` it is re-raised to `f`'s own exception targets instead of following
 *   the normal successor
 *
 * Termination: finite lattices (locations per site/context, 3-bit outcome
 * sets) plus a visit bound that reports non-convergence.
 *
 * References:
 * - Kildall, G. (1973). "A Unified Approach to Global Program Optimization"
 * - Kam, J. & Ullman, J. (1977). "Monotone Data Flow Analysis Frameworks"
 */

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::errors::{DisposeFlowError, Result};
use crate::features::dispose::application::{
    AnalysisSession, BlockOutput, DisposeTransfer, Frame, LostReference,
};
use crate::features::dispose::domain::AnalysisState;
use crate::features::flow_graph::domain::{BlockId, Condition, EdgeKind, RegionId, RegionKind};
use crate::features::flow_graph::infrastructure::{CfgStructure, ExceptionTarget};
use crate::features::points_to::application::PointsToTransfer;

/// Flow lane of a block entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lane {
    Normal,
    /// Inside finally region, entered by an exception
    Rethrow(RegionId),
}

/// Stable result of one procedure (or callee) fixpoint
#[derive(Debug, Clone, Default)]
pub struct FixpointResult {
    /// State reaching the normal exit
    pub exit: Option<AnalysisState>,
    /// Raised state of exceptions leaving the procedure
    pub unhandled: Option<AnalysisState>,
    /// Lost references observed on stable states
    pub lost: Vec<LostReference>,
    pub visits: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Block(BlockId, Lane),
    Unhandled,
}

/// Worklist fixpoint scheduler
pub struct FixpointScheduler;

impl FixpointScheduler {
    /// Run to fixpoint from `initial` at the entry block of `frame`
    pub fn run<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        initial: AnalysisState,
    ) -> Result<FixpointResult> {
        let cfg = &frame.procedure.cfg;
        let structure = frame.structure.clone();
        let limit = session.config.max_block_visits;

        let mut entries: Vec<BTreeMap<Lane, AnalysisState>> = vec![BTreeMap::new(); cfg.blocks.len()];
        let mut worklist: BTreeSet<(usize, BlockId, Lane)> = BTreeSet::new();

        entries[cfg.entry.index()].insert(Lane::Normal, initial);
        worklist.insert((structure.rpo_rank(cfg.entry).unwrap_or(0), cfg.entry, Lane::Normal));

        let mut visits = 0usize;
        while let Some((_, block, lane)) = worklist.pop_first() {
            session.check_cancelled()?;
            visits += 1;
            if visits > limit {
                debug!(
                    "Visit bound {} exceeded in '{}'",
                    limit,
                    frame.procedure.name.method_path()
                );
                return Err(DisposeFlowError::non_convergence(
                    frame.procedure.name.method_path(),
                    visits,
                ));
            }

            let Some(state) = entries[block.index()].get(&lane).cloned() else {
                continue;
            };
            let output = DisposeTransfer::transfer_block(session, frame, block, state)?;

            for (route, state) in Self::routes(frame, &structure, block, lane, output) {
                let Route::Block(target, target_lane) = route else {
                    continue;
                };
                let Some(rank) = structure.rpo_rank(target) else {
                    continue;
                };
                let changed = match entries[target.index()].entry(target_lane) {
                    Entry::Occupied(mut existing) => existing.get_mut().merge(&state),
                    Entry::Vacant(slot) => {
                        slot.insert(state);
                        true
                    }
                };
                if changed {
                    worklist.insert((rank, target, target_lane));
                }
            }
        }
        session.stats.block_visits += visits;
        trace!(
            "Fixpoint of '{}' (depth {}) after {} visits",
            frame.procedure.name.method_path(),
            frame.context.depth,
            visits
        );

        Self::replay(session, frame, &structure, &entries, visits)
    }

    /// One more transfer of every stable entry, collecting exits and lost
    /// references (recorded only here so transient states never report)
    fn replay<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        structure: &CfgStructure,
        entries: &[BTreeMap<Lane, AnalysisState>],
        visits: usize,
    ) -> Result<FixpointResult> {
        let exit_block = frame.procedure.cfg.exit;
        let mut result = FixpointResult {
            visits,
            ..FixpointResult::default()
        };

        for (index, lanes) in entries.iter().enumerate() {
            let block = BlockId(index as u32);
            for (lane, state) in lanes {
                session.check_cancelled()?;
                let mut output = DisposeTransfer::transfer_block(session, frame, block, state.clone())?;
                result.lost.append(&mut output.lost);

                let exits_normally = match lane {
                    Lane::Normal => true,
                    Lane::Rethrow(region) => !structure.in_region(block, *region),
                };
                if block == exit_block && exits_normally {
                    if let Some(normal) = &output.normal {
                        AnalysisState::join_into(&mut result.exit, normal.clone());
                    }
                }
                for (route, state) in Self::routes(frame, structure, block, *lane, output) {
                    if route == Route::Unhandled {
                        AnalysisState::join_into(&mut result.unhandled, state);
                    }
                }
            }
        }
        Ok(result)
    }

    fn routes(
        frame: &Frame<'_>,
        structure: &CfgStructure,
        block: BlockId,
        lane: Lane,
        output: BlockOutput,
    ) -> Vec<(Route, AnalysisState)> {
        let mut routes = Vec::new();

        if let Some(exceptional) = output.exceptional {
            for target in structure.exception_targets(block) {
                routes.push((Self::exception_route(structure, *target, lane), exceptional.clone()));
            }
        }

        let Some(normal) = output.normal else {
            return routes;
        };
        let Some(basic_block) = frame.procedure.cfg.block(block) else {
            return routes;
        };
        for edge in &basic_block.successors {
            let refined = match (edge.kind, output.condition) {
                (EdgeKind::WhenTrue, Some(condition)) => Self::refine(normal.clone(), condition, true),
                (EdgeKind::WhenFalse, Some(condition)) => Self::refine(normal.clone(), condition, false),
                _ => Some(normal.clone()),
            };
            let Some(state) = refined else {
                continue;
            };

            match lane {
                Lane::Rethrow(finally)
                    if structure.in_region(block, finally) && !structure.in_region(edge.target, finally) =>
                {
                    let mut raised = state;
                    raised.raise();
                    for target in structure.region_exception_targets(finally) {
                        routes.push((Self::exception_route(structure, *target, lane), raised.clone()));
                    }
                }
                _ => routes.push((Route::Block(edge.target, lane), state)),
            }
        }
        routes
    }

    fn exception_route(structure: &CfgStructure, target: ExceptionTarget, lane: Lane) -> Route {
        match target {
            ExceptionTarget::Unhandled => Route::Unhandled,
            ExceptionTarget::Handler {
                block,
                region,
                kind: RegionKind::Finally,
            } => Route::Block(block, Lane::Rethrow(region)),
            ExceptionTarget::Handler { block, .. } => {
                // a catch nested in the rethrowing finally keeps its lane
                let lane = match lane {
                    Lane::Rethrow(finally) if structure.in_region(block, finally) => lane,
                    _ => Lane::Normal,
                };
                Route::Block(block, lane)
            }
        }
    }

    /// State on a branch edge; `None` when the edge is infeasible
    fn refine(mut state: AnalysisState, condition: Condition, when_true: bool) -> Option<AnalysisState> {
        let (symbol, is_null) = match condition {
            Condition::IsNull(symbol) => (symbol, when_true),
            Condition::IsNotNull(symbol) => (symbol, !when_true),
            Condition::Opaque => return Some(state),
        };
        let refinement = PointsToTransfer::refine_null(&mut state.points_to, symbol, is_null)?;
        let dropped = refinement
            .dropped
            .into_iter()
            .filter(|loc| !state.dispose.get(*loc).map(|v| v.is_escaped()).unwrap_or(false))
            .collect();
        state.forget(&dropped);
        Some(state)
    }
}
