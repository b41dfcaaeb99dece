//! Analysis session
//!
//! One session per analyzed (top-level) procedure. It owns the location
//! factory, the structure cache and the interprocedural call cache, and is
//! passed by `&mut` down the call stack while callees are re-analyzed.
//! Nothing in it is shared between threads.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::api::CancellationToken;
use crate::config::AnalysisConfig;
use crate::errors::Result;
use crate::features::flow_graph::domain::{
    Operation, OperationRef, Procedure, ProcedureId, Program, TypeName,
};
use crate::features::flow_graph::infrastructure::CfgStructure;
use crate::features::flow_graph::ports::DisposableTypes;
use crate::features::interprocedural::{CallContext, CallOutcomeCache};
use crate::features::points_to::domain::{LocationFactory, LocationId, LocationKind, LocationRequest};

/// Counters reported with each procedure result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub block_visits: usize,
    pub callee_analyses: usize,
    pub memo_hits: usize,
    pub conservative_calls: usize,
    pub locations: usize,
}

/// Procedure currently being analyzed, in its call context
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub procedure_id: ProcedureId,
    pub procedure: &'a Procedure,
    pub structure: Rc<CfgStructure>,
    pub context: CallContext,
}

impl<'a> Frame<'a> {
    pub fn root(procedure_id: ProcedureId, procedure: &'a Procedure, structure: Rc<CfgStructure>) -> Self {
        Self {
            procedure_id,
            procedure,
            structure,
            context: CallContext::root(),
        }
    }

    #[inline]
    pub fn op_ref(&self, op: &Operation) -> OperationRef {
        OperationRef::new(self.procedure_id, op.id)
    }
}

/// Per-procedure analysis session
pub struct AnalysisSession<'a> {
    pub program: &'a Program,
    pub config: &'a AnalysisConfig,
    pub types: &'a dyn DisposableTypes,
    pub factory: LocationFactory,
    pub root: ProcedureId,
    pub root_structure: Rc<CfgStructure>,
    pub stats: AnalysisStats,
    pub(crate) calls: CallOutcomeCache,
    structures: FxHashMap<ProcedureId, Rc<CfgStructure>>,
    cancellation: CancellationToken,
}

impl<'a> AnalysisSession<'a> {
    pub fn new(
        program: &'a Program,
        config: &'a AnalysisConfig,
        types: &'a dyn DisposableTypes,
        cancellation: CancellationToken,
        root: ProcedureId,
        root_structure: Rc<CfgStructure>,
    ) -> Self {
        let mut structures = FxHashMap::default();
        structures.insert(root, root_structure.clone());
        Self {
            program,
            config,
            types,
            factory: LocationFactory::new(),
            root,
            root_structure,
            stats: AnalysisStats::default(),
            calls: CallOutcomeCache::new(config.memo_capacity),
            structures,
            cancellation,
        }
    }

    #[inline]
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancellation.check()
    }

    /// Structure of a procedure, analyzed on first use
    pub fn structure_for(&mut self, id: ProcedureId, procedure: &Procedure) -> Result<Rc<CfgStructure>> {
        if let Some(structure) = self.structures.get(&id) {
            return Ok(structure.clone());
        }
        let structure = Rc::new(CfgStructure::analyze(procedure)?);
        self.structures.insert(id, structure.clone());
        Ok(structure)
    }

    /// Location for a creation operation observed in `frame`
    pub fn location_for(
        &mut self,
        frame: &Frame<'_>,
        op: &Operation,
        slot: u32,
        kind: LocationKind,
        type_info: Option<TypeName>,
        is_disposable: bool,
        takes_ownership: bool,
    ) -> LocationId {
        let site = frame.op_ref(op);
        let report_site = frame.context.top_site().unwrap_or(site);
        let in_loop = self
            .root_structure
            .operation_position(report_site.operation)
            .map(|(block, _)| self.root_structure.in_loop(block))
            .unwrap_or(false);

        self.factory.location_for(LocationRequest {
            site,
            slot,
            context: frame.context.clone(),
            kind,
            type_info,
            is_disposable,
            takes_ownership,
            report_site: Some(report_site),
            in_loop,
        })
    }
}
