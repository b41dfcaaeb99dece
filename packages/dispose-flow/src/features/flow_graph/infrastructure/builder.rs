//! Procedure builder
//!
//! Constructs procedures without a real front end. Operation ids are assigned
//! in push order, so they follow source order when the caller pushes
//! statements top to bottom.
//!
//! # Example
//! ```
//! use dispose_flow::{ProcedureBuilder, QualifiedName};
//!
//! let mut b = ProcedureBuilder::method(QualifiedName::new("Demo", "C", "M"));
//! let a = b.local("a");
//! b.alloc(a, "Demo.Resource", "new Resource()");
//! b.release(a);
//! let procedure = b.build();
//! assert_eq!(procedure.cfg.blocks.len(), 2); // body + exit
//! ```

use crate::features::flow_graph::domain::*;

pub struct ProcedureBuilder {
    name: QualifiedName,
    kind: ProcedureKind,
    symbols: Vec<Symbol>,
    parameters: Vec<Parameter>,
    this_symbol: Option<SymbolId>,
    return_type: Option<TypeName>,
    blocks: Vec<BasicBlock>,
    regions: Vec<ExceptionRegion>,
    current: BlockId,
    exit: Option<BlockId>,
    next_op: OperationId,
}

impl ProcedureBuilder {
    /// Start a method; block 0 is the entry and the current block
    pub fn method(name: QualifiedName) -> Self {
        Self {
            name,
            kind: ProcedureKind::Method,
            symbols: Vec::new(),
            parameters: Vec::new(),
            this_symbol: None,
            return_type: None,
            blocks: vec![BasicBlock::new(BlockId(0))],
            regions: Vec::new(),
            current: BlockId(0),
            exit: None,
            next_op: 0,
        }
    }

    /// Start a constructor; `this` is bound to the new instance
    pub fn constructor(name: QualifiedName) -> Self {
        let mut builder = Self::method(name);
        builder.kind = ProcedureKind::Constructor;
        builder.this();
        builder
    }

    // ─── Symbols ─────────────────────────────────────────────────────────

    fn add_symbol(&mut self, name: &str, kind: SymbolKind, ty: Option<TypeName>) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            ty,
        });
        id
    }

    pub fn local(&mut self, name: &str) -> SymbolId {
        self.add_symbol(name, SymbolKind::Local, None)
    }

    pub fn typed_local(&mut self, name: &str, ty: impl Into<TypeName>) -> SymbolId {
        self.add_symbol(name, SymbolKind::Local, Some(ty.into()))
    }

    pub fn temp(&mut self) -> SymbolId {
        let name = format!("$t{}", self.symbols.len());
        self.add_symbol(&name, SymbolKind::Temporary, None)
    }

    pub fn parameter(&mut self, name: &str, ty: impl Into<TypeName>) -> SymbolId {
        self.parameter_with_mode(name, ty, ParameterMode::Value)
    }

    pub fn parameter_with_mode(
        &mut self,
        name: &str,
        ty: impl Into<TypeName>,
        mode: ParameterMode,
    ) -> SymbolId {
        let ty = ty.into();
        let symbol = self.add_symbol(name, SymbolKind::Parameter, Some(ty.clone()));
        self.parameters.push(Parameter { symbol, ty, mode });
        symbol
    }

    /// The `this` symbol, created on first use
    pub fn this(&mut self) -> SymbolId {
        match self.this_symbol {
            Some(id) => id,
            None => {
                let id = self.add_symbol("this", SymbolKind::This, None);
                self.this_symbol = Some(id);
                id
            }
        }
    }

    pub fn returns(&mut self, ty: impl Into<TypeName>) -> &mut Self {
        self.return_type = Some(ty.into());
        self
    }

    // ─── Blocks ──────────────────────────────────────────────────────────

    pub fn current(&self) -> BlockId {
        self.current
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// The exit block, created on first use
    pub fn exit_block(&mut self) -> BlockId {
        match self.exit {
            Some(id) => id,
            None => {
                let id = self.new_block();
                self.exit = Some(id);
                id
            }
        }
    }

    pub fn edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        if let Some(block) = self.blocks.get_mut(from.index()) {
            block.successors.push(Edge::new(to, kind));
        }
    }

    /// Normal edge from the current block
    pub fn goto(&mut self, target: BlockId) {
        self.edge(self.current, target, EdgeKind::Normal);
    }

    /// Back-edge from the current block to a loop header
    pub fn loop_back(&mut self, header: BlockId) {
        self.edge(self.current, header, EdgeKind::LoopBack);
    }

    /// Terminate the current block with a branch
    pub fn branch(&mut self, condition: Condition, when_true: BlockId, when_false: BlockId) {
        self.push(OperationKind::Branch { condition });
        self.edge(self.current, when_true, EdgeKind::WhenTrue);
        self.edge(self.current, when_false, EdgeKind::WhenFalse);
    }

    // ─── Operations ──────────────────────────────────────────────────────

    pub fn push(&mut self, kind: OperationKind) -> OperationId {
        self.push_operation(kind, None)
    }

    pub fn push_with_syntax(&mut self, kind: OperationKind, syntax: &str) -> OperationId {
        self.push_operation(kind, Some(syntax))
    }

    fn push_operation(&mut self, kind: OperationKind, syntax: Option<&str>) -> OperationId {
        let id = self.next_op;
        self.next_op += 1;
        let mut op = Operation::new(id, kind);
        op.syntax = syntax.map(str::to_string);
        if let Some(block) = self.blocks.get_mut(self.current.index()) {
            block.operations.push(op);
        }
        id
    }

    /// `target = new ty()` without a constructor body
    pub fn alloc(&mut self, target: SymbolId, ty: impl Into<TypeName>, syntax: &str) -> OperationId {
        self.alloc_with(target, ty, Vec::new(), None, syntax)
    }

    pub fn alloc_with(
        &mut self,
        target: SymbolId,
        ty: impl Into<TypeName>,
        arguments: Vec<Argument>,
        constructor: Option<CalleeRef>,
        syntax: &str,
    ) -> OperationId {
        self.push_with_syntax(
            OperationKind::Allocation {
                target,
                ty: ty.into(),
                arguments,
                constructor,
            },
            syntax,
        )
    }

    pub fn release(&mut self, receiver: SymbolId) -> OperationId {
        self.push(OperationKind::ReleaseCall {
            receiver,
            method: None,
        })
    }

    pub fn assign(&mut self, target: SymbolId, value: Operand) -> OperationId {
        self.push(OperationKind::Assignment { target, value })
    }

    pub fn call(
        &mut self,
        target: Option<SymbolId>,
        callee: CalleeRef,
        arguments: Vec<Argument>,
    ) -> OperationId {
        let syntax = format!("{}()", callee.name.rsplit('.').next().unwrap_or(&callee.name));
        self.push_with_syntax(
            OperationKind::Call {
                target,
                callee,
                receiver: None,
                arguments,
            },
            &syntax,
        )
    }

    pub fn field_write(&mut self, receiver: Receiver, field: &str, value: Operand) -> OperationId {
        self.push(OperationKind::FieldWrite {
            receiver,
            field: field.to_string(),
            value,
        })
    }

    pub fn field_read(&mut self, target: SymbolId, receiver: Receiver, field: &str) -> OperationId {
        self.push(OperationKind::FieldRead {
            target,
            receiver,
            field: field.to_string(),
        })
    }

    /// `return value`; links the current block to the exit block
    pub fn ret(&mut self, value: Option<Operand>) -> OperationId {
        let id = self.push(OperationKind::Return { value });
        let exit = self.exit_block();
        self.goto(exit);
        id
    }

    pub fn throw(&mut self, value: Option<Operand>) -> OperationId {
        self.push(OperationKind::Throw { value })
    }

    // ─── Regions ─────────────────────────────────────────────────────────

    fn add_region(&mut self, kind: RegionKind, blocks: &[BlockId], catches_all: bool) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(ExceptionRegion {
            id,
            kind,
            blocks: blocks.to_vec(),
            entry: blocks.first().copied().unwrap_or(BlockId(0)),
            handlers: Vec::new(),
            catches_all,
            parent: None,
        });
        id
    }

    /// Protected region; the first block is its entry
    pub fn try_region(&mut self, blocks: &[BlockId]) -> RegionId {
        self.add_region(RegionKind::Try, blocks, false)
    }

    pub fn catch_region(&mut self, protected: RegionId, blocks: &[BlockId], catches_all: bool) -> RegionId {
        let id = self.add_region(RegionKind::Catch, blocks, catches_all);
        if let Some(region) = self.regions.get_mut(protected.index()) {
            region.handlers.push(id);
        }
        id
    }

    pub fn finally_region(&mut self, protected: RegionId, blocks: &[BlockId]) -> RegionId {
        let id = self.add_region(RegionKind::Finally, blocks, false);
        if let Some(region) = self.regions.get_mut(protected.index()) {
            region.handlers.push(id);
        }
        id
    }

    /// Finish the procedure.
    ///
    /// Blocks without successors that do not end in a throw fall through to
    /// the exit block. Region parents are derived from block containment.
    pub fn build(mut self) -> Procedure {
        let exit = self.exit_block();
        for block in &mut self.blocks {
            let ends_in_throw = matches!(
                block.operations.last().map(|op| &op.kind),
                Some(OperationKind::Throw { .. })
            );
            if block.id != exit && block.successors.is_empty() && !ends_in_throw {
                block.successors.push(Edge::new(exit, EdgeKind::Normal));
            }
        }
        self.assign_region_parents();

        Procedure {
            name: self.name,
            kind: self.kind,
            symbols: self.symbols,
            parameters: self.parameters,
            this_symbol: self.this_symbol,
            return_type: self.return_type,
            cfg: ControlFlowGraph {
                blocks: self.blocks,
                entry: BlockId(0),
                exit,
                regions: self.regions,
            },
        }
    }

    fn assign_region_parents(&mut self) {
        // Try regions: smallest strictly enclosing region
        let mut parents = vec![None; self.regions.len()];
        for region in self.regions.iter().filter(|r| r.kind == RegionKind::Try) {
            parents[region.id.index()] = self
                .regions
                .iter()
                .filter(|other| {
                    other.id != region.id
                        && other.blocks.len() > region.blocks.len()
                        && region.blocks.iter().all(|b| other.contains(*b))
                })
                .min_by_key(|other| other.blocks.len())
                .map(|other| other.id);
        }
        // Handlers share the parent of their protected region
        for region in self.regions.iter().filter(|r| r.kind == RegionKind::Try) {
            let parent = parents[region.id.index()];
            for handler in &region.handlers {
                if let Some(slot) = parents.get_mut(handler.index()) {
                    *slot = parent;
                }
            }
        }
        for (region, parent) in self.regions.iter_mut().zip(parents) {
            region.parent = parent;
        }
    }
}
