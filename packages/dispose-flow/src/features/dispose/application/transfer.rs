/*
 * Dispose Transfer Functions
 *
 * Per-operation update of the combined (points-to, dispose) state.
 *
 * Ownership discharge:
 * - release call         → receiver locations Disposed
 * - field store, element store into an escaped or disposable container,
 *   return, throw, opaque use → Escaped (transitively through heap slots)
 * - owning wrapper ctor  → constructor arguments Escaped
 *
 * Allocations and calls first join their pre-state (raised) into the
 * block's exceptional output; a throw joins its post-state. Overwriting the last holder of an open
 * location records a lost reference.
 */

use tracing::trace;

use super::session::{AnalysisSession, Frame};
use crate::errors::{DisposeFlowError, Result};
use crate::features::dispose::domain::{AnalysisState, DisposeValue};
use crate::features::dispose::infrastructure::OwnershipEffect;
use crate::features::flow_graph::domain::{
    Argument, ArgumentMode, BlockId, CalleeRef, Condition, Operand, Operation, OperationKind,
    OperationRef, Receiver, SymbolId, TypeName,
};
use crate::features::interprocedural::{CallArgument, CallOutcome, CallRequest, InterproceduralEngine};
use crate::features::points_to::application::PointsToTransfer;
use crate::features::points_to::domain::{FieldKey, LocationId, LocationKind, PointsToSet};

/// Open location whose last holder was overwritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostReference {
    pub location: LocationId,
    pub value: DisposeValue,
    pub site: OperationRef,
}

/// Result of transferring one block
#[derive(Debug, Clone, Default)]
pub struct BlockOutput {
    /// State at the end of the block (`None` if it ends in a throw)
    pub normal: Option<AnalysisState>,
    /// Join of the raised states of every operation that may throw
    pub exceptional: Option<AnalysisState>,
    /// Condition of a trailing branch
    pub condition: Option<Condition>,
    pub lost: Vec<LostReference>,
}

enum Flow {
    Continue,
    Terminated,
}

/// Dispose transfer functions
pub struct DisposeTransfer;

impl DisposeTransfer {
    /// Transfer `block` starting from `state`
    pub fn transfer_block<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        block: BlockId,
        mut state: AnalysisState,
    ) -> Result<BlockOutput> {
        let procedure = frame.procedure;
        let basic_block = procedure.cfg.block(block).ok_or_else(|| {
            DisposeFlowError::malformed(procedure.name.method_path(), format!("missing block {}", block))
        })?;

        let mut output = BlockOutput::default();
        for op in &basic_block.operations {
            if let Flow::Terminated = Self::transfer_operation(session, frame, op, &mut state, &mut output)? {
                return Ok(output);
            }
            if let OperationKind::Branch { condition } = op.kind {
                output.condition = Some(condition);
            }
        }
        output.normal = Some(state);
        Ok(output)
    }

    fn transfer_operation<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        op: &Operation,
        state: &mut AnalysisState,
        output: &mut BlockOutput,
    ) -> Result<Flow> {
        let site = frame.op_ref(op);
        // a throw raises its own post-state once the thrown value has escaped
        if op.may_throw() && !matches!(op.kind, OperationKind::Throw { .. }) {
            Self::raise_into(output, state);
        }

        match &op.kind {
            OperationKind::Allocation {
                target,
                ty,
                arguments,
                constructor,
            } => {
                return Self::allocation(session, frame, op, *target, ty, arguments, constructor.as_ref(), state, output);
            }

            OperationKind::ReleaseCall { receiver, method } => {
                let receivers = state.points_to.get(*receiver).clone();
                if let Some(callee) = method.as_ref().and_then(|m| m.analyzable_target()) {
                    let request = CallRequest {
                        site,
                        callee,
                        receiver: Some(receivers.clone()),
                        arguments: Vec::new(),
                    };
                    if let Some(outcome) = InterproceduralEngine::analyze_call(session, frame, &request, state)? {
                        if let Some(exceptional) = outcome.exceptional {
                            AnalysisState::join_into(&mut output.exceptional, exceptional);
                        }
                        match outcome.normal {
                            Some(normal) => *state = normal,
                            None => return Ok(Flow::Terminated),
                        }
                    }
                }
                for loc in receivers.tracked() {
                    state.dispose.dispose(loc);
                }
            }

            OperationKind::Assignment { target, value } => {
                let pts = PointsToTransfer::evaluate(&state.points_to, value);
                Self::assign(state, *target, pts, site, output);
            }

            OperationKind::Select { target, operands } => {
                let pts = PointsToTransfer::evaluate_all(&state.points_to, operands);
                Self::assign(state, *target, pts, site, output);
            }

            OperationKind::FieldWrite { receiver, field, value } => {
                let value = PointsToTransfer::evaluate(&state.points_to, value);
                let field = FieldKey::Named(field.clone());
                match receiver {
                    Receiver::Local(symbol) => {
                        // fields are not tracked for ownership: the holder owns the value
                        Self::escape(state, &value);
                        let receivers = state.points_to.get(*symbol).clone();
                        Self::store(session, state, &receivers, field, &value, false, site, output);
                    }
                    Receiver::This => {
                        // stored into the instance: owned by it from here on
                        Self::escape(state, &value);
                        if let Some(this) = frame.procedure.this_symbol {
                            let receivers = state.points_to.get(this).clone();
                            PointsToTransfer::write_slot(&mut state.points_to, &receivers, field, &value);
                        }
                    }
                    Receiver::Static(_) => Self::escape(state, &value),
                }
            }

            OperationKind::FieldRead { target, receiver, field } => {
                let field = FieldKey::Named(field.clone());
                let pts = match receiver {
                    Receiver::Local(symbol) => {
                        let receivers = state.points_to.get(*symbol).clone();
                        PointsToTransfer::read_slot(&state.points_to, &receivers, &field)
                    }
                    Receiver::This => match frame.procedure.this_symbol {
                        Some(this) => {
                            let receivers = state.points_to.get(this).clone();
                            PointsToTransfer::read_slot(&state.points_to, &receivers, &field)
                        }
                        None => PointsToSet::unknown(),
                    },
                    Receiver::Static(_) => PointsToSet::unknown(),
                };
                Self::assign(state, *target, pts, site, output);
            }

            OperationKind::ElementWrite { collection, value } => {
                let value = PointsToTransfer::evaluate(&state.points_to, value);
                let receivers = state.points_to.get(*collection).clone();
                Self::store(session, state, &receivers, FieldKey::Element, &value, true, site, output);
            }

            OperationKind::ElementRead { target, collection } => {
                let receivers = state.points_to.get(*collection).clone();
                let pts = PointsToTransfer::read_slot(&state.points_to, &receivers, &FieldKey::Element);
                Self::assign(state, *target, pts, site, output);
            }

            OperationKind::TupleCreate { target, elements } => {
                let loc = session.location_for(frame, op, 0, LocationKind::Tuple, None, false, false);
                state.dispose.set(loc, DisposeValue::allocated());
                for (index, element) in elements.iter().enumerate() {
                    let pts = PointsToTransfer::evaluate(&state.points_to, element);
                    let old = state
                        .points_to
                        .set_slot(loc, FieldKey::TupleItem(index as u32), pts.clone());
                    let removed: Vec<LocationId> = old.tracked().filter(|l| !pts.contains(*l)).collect();
                    Self::check_lost(state, &removed, site, output);
                }
                Self::assign(state, *target, PointsToSet::singleton(loc), site, output);
            }

            OperationKind::Deconstruct { targets, tuple } => {
                let receivers = state.points_to.get(*tuple).clone();
                for (index, target) in targets.iter().enumerate() {
                    if let Some(target) = target {
                        let field = FieldKey::TupleItem(index as u32);
                        let pts = PointsToTransfer::read_slot(&state.points_to, &receivers, &field);
                        Self::assign(state, *target, pts, site, output);
                    }
                }
            }

            OperationKind::Call {
                target,
                callee,
                receiver,
                arguments,
            } => {
                return Self::call(session, frame, op, *target, callee, receiver.as_ref(), arguments, state, output);
            }

            OperationKind::Return { value } => {
                if let Some(value) = value {
                    let pts = PointsToTransfer::evaluate(&state.points_to, value);
                    if frame.context.is_root() {
                        Self::escape(state, &pts);
                    } else {
                        state.points_to.add_returned(&pts);
                    }
                }
            }

            OperationKind::Throw { value } => {
                if let Some(value) = value {
                    let pts = PointsToTransfer::evaluate(&state.points_to, value);
                    Self::escape(state, &pts);
                }
                Self::raise_into(output, state);
                return Ok(Flow::Terminated);
            }

            OperationKind::Branch { .. } | OperationKind::RegionBoundary { .. } => {}

            OperationKind::Opaque { target, operands } => {
                for operand in operands {
                    let pts = PointsToTransfer::evaluate(&state.points_to, operand);
                    Self::escape(state, &pts);
                }
                if let Some(target) = target {
                    Self::assign(state, *target, PointsToSet::unknown(), site, output);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn allocation<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        op: &Operation,
        target: SymbolId,
        ty: &TypeName,
        arguments: &[Argument],
        constructor: Option<&CalleeRef>,
        state: &mut AnalysisState,
        output: &mut BlockOutput,
    ) -> Result<Flow> {
        let site = frame.op_ref(op);
        let is_disposable = session.types.is_disposable(ty);
        let takes_ownership = session.config.ownership_rules.takes_ownership(ty);
        let loc = session.location_for(
            frame,
            op,
            0,
            LocationKind::Allocation,
            Some(ty.clone()),
            is_disposable,
            takes_ownership,
        );

        // previous instance from this site (loop re-entry) held only by `target`
        Self::check_reallocated(state, loc, Some(target), site, output);

        let call_arguments = Self::call_arguments(state, arguments);
        state.dispose.set(loc, DisposeValue::allocated());

        if takes_ownership || session.config.ownership_transfer_at_constructor {
            for argument in &call_arguments {
                Self::escape(state, &argument.pts);
            }
        } else if let Some(callee) = constructor.and_then(|c| c.analyzable_target()) {
            let request = CallRequest {
                site,
                callee,
                receiver: Some(PointsToSet::singleton(loc)),
                arguments: call_arguments,
            };
            match InterproceduralEngine::analyze_call(session, frame, &request, state)? {
                Some(outcome) => {
                    if let Some(mut exceptional) = outcome.exceptional {
                        // the instance never reaches the caller
                        exceptional.forget(&[loc].into_iter().collect());
                        AnalysisState::join_into(&mut output.exceptional, exceptional);
                    }
                    match outcome.normal {
                        Some(normal) => *state = normal,
                        None => return Ok(Flow::Terminated),
                    }
                    Self::write_back(state, &outcome.written_back, site, output);
                }
                None => Self::unresolved(session, state, &request.arguments, site, output),
            }
        } else {
            Self::unresolved(session, state, &call_arguments, site, output);
        }

        Self::assign(state, target, PointsToSet::singleton(loc), site, output);
        Ok(Flow::Continue)
    }

    fn call<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        op: &Operation,
        target: Option<SymbolId>,
        callee: &CalleeRef,
        receiver: Option<&Operand>,
        arguments: &[Argument],
        state: &mut AnalysisState,
        output: &mut BlockOutput,
    ) -> Result<Flow> {
        let site = frame.op_ref(op);
        let receiver = receiver.map(|r| PointsToTransfer::evaluate(&state.points_to, r));
        let call_arguments = Self::call_arguments(state, arguments);

        let rule_effects = session
            .config
            .ownership_rules
            .effects_for(&callee.name)
            .map(|effects| effects.to_vec());

        let result = if let Some(effects) = rule_effects {
            trace!("Ownership rule applied at '{}'", callee.name);
            Self::apply_rule(session, frame, op, target, callee, receiver.as_ref(), &call_arguments, &effects, state, output)
        } else if let Some(procedure) = callee.analyzable_target() {
            let request = CallRequest {
                site,
                callee: procedure,
                receiver,
                arguments: call_arguments,
            };
            match InterproceduralEngine::analyze_call(session, frame, &request, state)? {
                Some(CallOutcome {
                    normal,
                    exceptional,
                    returned,
                    written_back,
                }) => {
                    if let Some(exceptional) = exceptional {
                        AnalysisState::join_into(&mut output.exceptional, exceptional);
                    }
                    match normal {
                        Some(normal) => *state = normal,
                        None => return Ok(Flow::Terminated),
                    }
                    Self::write_back(state, &written_back, site, output);
                    if session.config.ownership_transfer_at_method_call {
                        for argument in &request.arguments {
                            Self::escape_disposable(session, state, &argument.pts);
                        }
                    }
                    if returned.is_empty() {
                        PointsToSet::unknown()
                    } else {
                        returned
                    }
                }
                None => {
                    Self::unresolved(session, state, &request.arguments, site, output);
                    PointsToSet::unknown()
                }
            }
        } else {
            Self::unresolved(session, state, &call_arguments, site, output);
            PointsToSet::unknown()
        };

        if let Some(target) = target {
            Self::assign(state, target, result, site, output);
        }
        Ok(Flow::Continue)
    }

    /// Apply an ownership rule; returns the call result
    fn apply_rule<'a>(
        session: &mut AnalysisSession<'a>,
        frame: &Frame<'a>,
        op: &Operation,
        target: Option<SymbolId>,
        callee: &CalleeRef,
        receiver: Option<&PointsToSet>,
        arguments: &[CallArgument],
        effects: &[OwnershipEffect],
        state: &mut AnalysisState,
        output: &mut BlockOutput,
    ) -> PointsToSet {
        let site = frame.op_ref(op);
        let mut result = PointsToSet::unknown();
        let mut produced_out: Vec<usize> = Vec::new();

        for effect in effects {
            match effect {
                OwnershipEffect::TransferArgument { index } => {
                    if let Some(argument) = arguments.get(*index) {
                        Self::escape(state, &argument.pts);
                    }
                }
                OwnershipEffect::TransferAllArguments => {
                    for argument in arguments {
                        Self::escape(state, &argument.pts);
                    }
                }
                OwnershipEffect::ReturnsNewInstance => {
                    let ty = callee.return_type.clone().or_else(|| {
                        target
                            .and_then(|t| frame.procedure.symbol(t))
                            .and_then(|s| s.ty.clone())
                    });
                    // the rule asserts a disposable result even when the type is unknown
                    let is_disposable = ty.as_ref().map(|t| session.types.is_disposable(t)).unwrap_or(true);
                    let loc = session.location_for(frame, op, 0, LocationKind::FactoryResult, ty, is_disposable, false);
                    Self::check_reallocated(state, loc, target, site, output);
                    state.dispose.set(loc, DisposeValue::allocated());
                    result = PointsToSet::singleton(loc);
                }
                OwnershipEffect::OutArgumentNewInstance { index } => {
                    let Some(symbol) = arguments.get(*index).and_then(|a| a.written) else {
                        continue;
                    };
                    let ty = frame.procedure.symbol(symbol).and_then(|s| s.ty.clone());
                    let is_disposable = ty.as_ref().map(|t| session.types.is_disposable(t)).unwrap_or(true);
                    let loc = session.location_for(
                        frame,
                        op,
                        *index as u32 + 1,
                        LocationKind::OutArgument { index: *index },
                        ty,
                        is_disposable,
                        false,
                    );
                    Self::check_reallocated(state, loc, Some(symbol), site, output);
                    state.dispose.set(loc, DisposeValue::allocated());
                    Self::assign(state, symbol, PointsToSet::singleton(loc), site, output);
                    produced_out.push(*index);
                }
                OwnershipEffect::DisposesArgument { index } => {
                    if let Some(argument) = arguments.get(*index) {
                        for loc in argument.pts.tracked() {
                            state.dispose.dispose(loc);
                        }
                    }
                }
                OwnershipEffect::DisposesReceiver => {
                    if let Some(receiver) = receiver {
                        for loc in receiver.tracked() {
                            state.dispose.dispose(loc);
                        }
                    }
                }
                OwnershipEffect::NoEffect => {}
            }
        }

        // out arguments not produced by the rule hold an unknown value
        for (index, argument) in arguments.iter().enumerate() {
            if argument.mode == ArgumentMode::Out && !produced_out.contains(&index) {
                if let Some(symbol) = argument.written {
                    Self::assign(state, symbol, PointsToSet::unknown(), site, output);
                }
            }
        }
        result
    }

    /// Conservative summary of a call that is not analyzed
    ///
    /// Arguments escape (transitively), `ref`/`out` arguments become unknown.
    /// The receiver keeps its state.
    fn unresolved(
        session: &mut AnalysisSession<'_>,
        state: &mut AnalysisState,
        arguments: &[CallArgument],
        site: OperationRef,
        output: &mut BlockOutput,
    ) {
        session.stats.conservative_calls += 1;
        for argument in arguments {
            if argument.mode != ArgumentMode::Out {
                Self::escape(state, &argument.pts);
            }
        }
        for argument in arguments {
            if let Some(symbol) = argument.written {
                Self::assign(state, symbol, PointsToSet::unknown(), site, output);
            }
        }
    }

    fn call_arguments(state: &AnalysisState, arguments: &[Argument]) -> Vec<CallArgument> {
        arguments
            .iter()
            .map(|argument| CallArgument {
                mode: argument.mode,
                written: argument.written_symbol(),
                pts: match argument.mode {
                    ArgumentMode::Out => PointsToSet::empty(),
                    _ => PointsToTransfer::evaluate(&state.points_to, &argument.value),
                },
            })
            .collect()
    }

    fn write_back(
        state: &mut AnalysisState,
        written_back: &[(SymbolId, PointsToSet)],
        site: OperationRef,
        output: &mut BlockOutput,
    ) {
        for (symbol, pts) in written_back {
            Self::assign(state, *symbol, pts.clone(), site, output);
        }
    }

    /// Store `value` into `field` of `receivers`
    ///
    /// The value escapes when the container may be unknown, is disposable
    /// (it takes ownership) or has already escaped.
    fn store(
        session: &AnalysisSession<'_>,
        state: &mut AnalysisState,
        receivers: &PointsToSet,
        field: FieldKey,
        value: &PointsToSet,
        weak: bool,
        site: OperationRef,
        output: &mut BlockOutput,
    ) {
        let escapes = receivers.is_empty()
            || receivers.may_be_unknown()
            || receivers.tracked().any(|r| {
                session.factory.is_disposable(r)
                    || state.dispose.get(r).map(|v| v.is_escaped()).unwrap_or(false)
            });
        if escapes {
            Self::escape(state, value);
        }

        if weak {
            PointsToTransfer::add_to_slot(&mut state.points_to, receivers, field, value);
        } else {
            let removed = PointsToTransfer::write_slot(&mut state.points_to, receivers, field, value);
            Self::check_lost(state, &removed, site, output);
        }
    }

    /// `target = pts`, checking the locations `target` no longer holds
    fn assign(
        state: &mut AnalysisState,
        target: SymbolId,
        pts: PointsToSet,
        site: OperationRef,
        output: &mut BlockOutput,
    ) {
        let removed = PointsToTransfer::assign(&mut state.points_to, target, pts);
        Self::check_lost(state, &removed, site, output);
    }

    fn check_lost(state: &AnalysisState, removed: &[LocationId], site: OperationRef, output: &mut BlockOutput) {
        for loc in removed {
            if let Some(value) = state.dispose.get(*loc) {
                if value.is_open() && !state.points_to.is_referenced(*loc, None) {
                    output.lost.push(LostReference {
                        location: *loc,
                        value: *value,
                        site,
                    });
                }
            }
        }
    }

    /// A creation site reached again while its previous instance is still
    /// open and held by nothing but `holder`
    fn check_reallocated(
        state: &AnalysisState,
        loc: LocationId,
        holder: Option<SymbolId>,
        site: OperationRef,
        output: &mut BlockOutput,
    ) {
        if let Some(value) = state.dispose.get(loc) {
            if value.is_open() && !state.points_to.is_referenced(loc, holder) {
                output.lost.push(LostReference {
                    location: loc,
                    value: *value,
                    site,
                });
            }
        }
    }

    fn escape(state: &mut AnalysisState, pts: &PointsToSet) {
        state.escape_reachable(pts.tracked());
    }

    /// Escape only the disposable members of `pts` (and what they hold)
    fn escape_disposable(session: &AnalysisSession<'_>, state: &mut AnalysisState, pts: &PointsToSet) {
        let roots: Vec<LocationId> = pts.tracked().filter(|l| session.factory.is_disposable(*l)).collect();
        state.escape_reachable(roots);
    }

    fn raise_into(output: &mut BlockOutput, state: &AnalysisState) {
        let mut raised = state.clone();
        raised.raise();
        AnalysisState::join_into(&mut output.exceptional, raised);
    }
}
