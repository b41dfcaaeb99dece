/*
 * CFG Structure Analysis
 *
 * Derives everything the scheduler and transfer functions need from a
 * procedure CFG, once per procedure:
 * - reverse post-order rank of each reachable block (normal + handler edges)
 * - loop membership (natural loops of DFS back-edges and explicit LoopBack edges)
 * - exception targets of each block (catch entries, finally entry, or unhandled)
 * - exception targets of each region (where a rethrow leaving a finally goes)
 *
 * Algorithm:
 * - petgraph DfsPostOrder for RPO
 * - petgraph depth_first_search BackEdge events + backward walk for loop bodies
 *
 * Complexity: O(B + E + R·D) with D the region nesting depth
 */

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent, DfsPostOrder};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::errors::{DisposeFlowError, Result};
use crate::features::flow_graph::domain::*;

/// Where an exception raised in a block is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionTarget {
    /// Entry block of a catch or finally region
    Handler {
        block: BlockId,
        region: RegionId,
        kind: RegionKind,
    },
    /// Leaves the procedure
    Unhandled,
}

/// Precomputed structure of one CFG
#[derive(Debug, Clone)]
pub struct CfgStructure {
    rpo_rank: Vec<Option<usize>>,
    in_loop: Vec<bool>,
    block_regions: Vec<Vec<RegionId>>,
    block_targets: Vec<Vec<ExceptionTarget>>,
    region_targets: Vec<Vec<ExceptionTarget>>,
    op_positions: FxHashMap<OperationId, (BlockId, usize)>,
}

impl CfgStructure {
    /// Validate and analyze a procedure CFG
    pub fn analyze(procedure: &Procedure) -> Result<Self> {
        let cfg = &procedure.cfg;
        let name = procedure.name.method_path();
        cfg.validate()
            .map_err(|reason| DisposeFlowError::malformed(&name, reason))?;

        let n = cfg.blocks.len();
        let owners = handler_owners(cfg);
        let depths = region_depths(cfg).map_err(|reason| DisposeFlowError::malformed(&name, reason))?;

        let region_targets: Vec<Vec<ExceptionTarget>> = cfg
            .regions
            .iter()
            .map(|r| targets_for_region(cfg, r.id, &owners, 0))
            .collect();

        let mut block_regions = vec![Vec::new(); n];
        for region in &cfg.regions {
            for block in &region.blocks {
                block_regions[block.index()].push(region.id);
            }
        }

        let block_targets: Vec<Vec<ExceptionTarget>> = block_regions
            .iter()
            .map(|regions| {
                regions
                    .iter()
                    .max_by_key(|r| depths[r.index()])
                    .map(|r| region_targets[r.index()].clone())
                    .unwrap_or_else(|| vec![ExceptionTarget::Unhandled])
            })
            .collect();

        let rpo_rank = reverse_post_order(cfg, &block_targets);
        let in_loop = loop_membership(cfg);

        let mut op_positions = FxHashMap::default();
        for block in &cfg.blocks {
            for (pos, op) in block.operations.iter().enumerate() {
                op_positions.insert(op.id, (block.id, pos));
            }
        }

        Ok(Self {
            rpo_rank,
            in_loop,
            block_regions,
            block_targets,
            region_targets,
            op_positions,
        })
    }

    /// Reverse post-order rank; `None` for unreachable blocks
    pub fn rpo_rank(&self, block: BlockId) -> Option<usize> {
        self.rpo_rank.get(block.index()).copied().flatten()
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_rank(block).is_some()
    }

    pub fn in_loop(&self, block: BlockId) -> bool {
        self.in_loop.get(block.index()).copied().unwrap_or(false)
    }

    pub fn in_region(&self, block: BlockId, region: RegionId) -> bool {
        self.block_regions
            .get(block.index())
            .map(|rs| rs.contains(&region))
            .unwrap_or(false)
    }

    /// Targets of an exception raised by an operation of `block`
    pub fn exception_targets(&self, block: BlockId) -> &[ExceptionTarget] {
        self.block_targets
            .get(block.index())
            .map(Vec::as_slice)
            .unwrap_or(&[ExceptionTarget::Unhandled])
    }

    /// Targets of an exception raised inside `region` (outside any nested region)
    pub fn region_exception_targets(&self, region: RegionId) -> &[ExceptionTarget] {
        self.region_targets
            .get(region.index())
            .map(Vec::as_slice)
            .unwrap_or(&[ExceptionTarget::Unhandled])
    }

    /// (block, position) of an operation
    pub fn operation_position(&self, op: OperationId) -> Option<(BlockId, usize)> {
        self.op_positions.get(&op).copied()
    }
}

/// handler region → owning try region
fn handler_owners(cfg: &ControlFlowGraph) -> Vec<Option<RegionId>> {
    let mut owners = vec![None; cfg.regions.len()];
    for region in cfg.regions.iter().filter(|r| r.kind == RegionKind::Try) {
        for handler in &region.handlers {
            owners[handler.index()] = Some(region.id);
        }
    }
    owners
}

fn region_depths(cfg: &ControlFlowGraph) -> std::result::Result<Vec<usize>, String> {
    let limit = cfg.regions.len();
    cfg.regions
        .iter()
        .map(|region| {
            let mut depth = 0;
            let mut current = region.parent;
            while let Some(parent) = current {
                depth += 1;
                if depth > limit {
                    return Err(format!("region {} has a cyclic parent chain", region.id.0));
                }
                current = cfg.region(parent).and_then(|p| p.parent);
            }
            Ok(depth)
        })
        .collect()
}

fn targets_for_region(
    cfg: &ControlFlowGraph,
    region: RegionId,
    owners: &[Option<RegionId>],
    depth: usize,
) -> Vec<ExceptionTarget> {
    // Guards against ill-formed handler/parent cycles
    if depth > cfg.regions.len() {
        return vec![ExceptionTarget::Unhandled];
    }
    let Some(r) = cfg.region(region) else {
        return vec![ExceptionTarget::Unhandled];
    };
    match r.kind {
        RegionKind::Try => {
            let mut targets = Vec::new();
            for handler in r.handlers.iter().filter_map(|h| cfg.region(*h)) {
                targets.push(ExceptionTarget::Handler {
                    block: handler.entry,
                    region: handler.id,
                    kind: handler.kind,
                });
                if handler.kind == RegionKind::Finally || handler.catches_all {
                    return targets;
                }
            }
            targets.extend(outer_targets(cfg, r.parent, owners, depth));
            targets
        }
        RegionKind::Catch => {
            let owner = owners[region.index()].and_then(|t| cfg.region(t));
            let finally = owner.and_then(|t| {
                t.handlers
                    .iter()
                    .filter_map(|h| cfg.region(*h))
                    .find(|h| h.kind == RegionKind::Finally)
            });
            match (finally, owner) {
                (Some(f), _) => vec![ExceptionTarget::Handler {
                    block: f.entry,
                    region: f.id,
                    kind: RegionKind::Finally,
                }],
                (None, Some(t)) => outer_targets(cfg, t.parent, owners, depth),
                (None, None) => outer_targets(cfg, r.parent, owners, depth),
            }
        }
        RegionKind::Finally => {
            let parent = owners[region.index()]
                .and_then(|t| cfg.region(t))
                .map(|t| t.parent)
                .unwrap_or(r.parent);
            outer_targets(cfg, parent, owners, depth)
        }
    }
}

fn outer_targets(
    cfg: &ControlFlowGraph,
    parent: Option<RegionId>,
    owners: &[Option<RegionId>],
    depth: usize,
) -> Vec<ExceptionTarget> {
    match parent {
        Some(p) => targets_for_region(cfg, p, owners, depth + 1),
        None => vec![ExceptionTarget::Unhandled],
    }
}

fn build_graph(
    cfg: &ControlFlowGraph,
    handler_edges: Option<&[Vec<ExceptionTarget>]>,
) -> DiGraph<(), EdgeKind> {
    let mut graph = DiGraph::with_capacity(cfg.blocks.len(), cfg.blocks.len() * 2);
    for _ in &cfg.blocks {
        graph.add_node(());
    }
    for block in &cfg.blocks {
        let from = NodeIndex::new(block.id.index());
        for edge in &block.successors {
            graph.add_edge(from, NodeIndex::new(edge.target.index()), edge.kind);
        }
        if let Some(targets) = handler_edges {
            let throws = block.operations.iter().any(Operation::may_throw);
            if !throws {
                continue;
            }
            for target in &targets[block.id.index()] {
                if let ExceptionTarget::Handler { block: to, .. } = target {
                    graph.add_edge(from, NodeIndex::new(to.index()), EdgeKind::Normal);
                }
            }
        }
    }
    graph
}

fn reverse_post_order(
    cfg: &ControlFlowGraph,
    block_targets: &[Vec<ExceptionTarget>],
) -> Vec<Option<usize>> {
    let graph = build_graph(cfg, Some(block_targets));
    let mut post_order = Vec::with_capacity(cfg.blocks.len());
    let mut dfs = DfsPostOrder::new(&graph, NodeIndex::new(cfg.entry.index()));
    while let Some(node) = dfs.next(&graph) {
        post_order.push(node.index());
    }

    let mut ranks = vec![None; cfg.blocks.len()];
    for (rank, block) in post_order.into_iter().rev().enumerate() {
        ranks[block] = Some(rank);
    }
    ranks
}

fn loop_membership(cfg: &ControlFlowGraph) -> Vec<bool> {
    let graph = build_graph(cfg, None);
    let mut back_edges: FxHashSet<(usize, usize)> = FxHashSet::default();
    depth_first_search(&graph, Some(NodeIndex::new(cfg.entry.index())), |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.insert((u.index(), v.index()));
        }
    });
    for block in &cfg.blocks {
        for edge in block.successors.iter().filter(|e| e.kind == EdgeKind::LoopBack) {
            back_edges.insert((block.id.index(), edge.target.index()));
        }
    }

    let mut predecessors = vec![Vec::new(); cfg.blocks.len()];
    for block in &cfg.blocks {
        for edge in &block.successors {
            predecessors[edge.target.index()].push(block.id.index());
        }
    }

    let mut in_loop = vec![false; cfg.blocks.len()];
    for (latch, header) in back_edges {
        // Natural loop: header plus everything reaching the latch without passing the header
        let mut body: FxHashSet<usize> = FxHashSet::default();
        body.insert(header);
        let mut stack = vec![latch];
        while let Some(b) = stack.pop() {
            if body.insert(b) {
                stack.extend(predecessors[b].iter().copied());
            }
        }
        for b in body {
            in_loop[b] = true;
        }
    }
    in_loop
}
