//! Control Flow Graph
//!
//! Arena of basic blocks with integer indices. Exceptional control flow is
//! not encoded as edges: it is derived from the region table by
//! [`crate::features::flow_graph::infrastructure::CfgStructure`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::operation::{Operation, OperationId};

/// Basic block index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Exception region index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl RegionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Normal successor edge kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Normal,
    /// Taken when the block's branch condition holds
    WhenTrue,
    /// Taken when the block's branch condition does not hold
    WhenFalse,
    /// Loop back-edge (latch → header)
    LoopBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub target: BlockId,
    #[serde(default)]
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(target: BlockId, kind: EdgeKind) -> Self {
        Self { target, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub successors: Vec<Edge>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            operations: Vec::new(),
            successors: Vec::new(),
        }
    }
}

/// Exception region kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Try,
    Catch,
    Finally,
}

/// try/catch/finally region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegion {
    pub id: RegionId,
    pub kind: RegionKind,
    /// Blocks covered by the region (nested regions included)
    pub blocks: Vec<BlockId>,
    /// First block executed when the region is entered
    pub entry: BlockId,
    /// `Try` only: attached catch regions (in order) and finally region
    #[serde(default)]
    pub handlers: Vec<RegionId>,
    /// `Catch` only: the clause catches every exception
    #[serde(default)]
    pub catches_all: bool,
    /// Innermost enclosing region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RegionId>,
}

impl ExceptionRegion {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

/// Procedure CFG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
    #[serde(default)]
    pub regions: Vec<ExceptionRegion>,
}

impl ControlFlowGraph {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    pub fn region(&self, id: RegionId) -> Option<&ExceptionRegion> {
        self.regions.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Find an operation by id: (block, position in block, operation)
    pub fn find_operation(&self, id: OperationId) -> Option<(BlockId, usize, &Operation)> {
        self.blocks.iter().find_map(|block| {
            block
                .operations
                .iter()
                .position(|op| op.id == id)
                .map(|pos| (block.id, pos, &block.operations[pos]))
        })
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.blocks.iter().flat_map(|b| b.operations.iter())
    }

    /// Check every block, edge and region reference.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.blocks.len();
        if n == 0 {
            return Err("CFG has no blocks".to_string());
        }
        if self.entry.index() >= n {
            return Err(format!("entry block {} does not exist", self.entry));
        }
        if self.exit.index() >= n {
            return Err(format!("exit block {} does not exist", self.exit));
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.id.index() != i {
                return Err(format!("block at index {} carries id {}", i, block.id));
            }
            for edge in &block.successors {
                if edge.target.index() >= n {
                    return Err(format!(
                        "edge {} -> {} targets a missing block",
                        block.id, edge.target
                    ));
                }
            }
        }
        for (i, region) in self.regions.iter().enumerate() {
            if region.id.index() != i {
                return Err(format!("region at index {} carries id {}", i, region.id.0));
            }
            if region.entry.index() >= n || !region.contains(region.entry) {
                return Err(format!("region {} has an invalid entry block", i));
            }
            if let Some(b) = region.blocks.iter().find(|b| b.index() >= n) {
                return Err(format!("region {} covers missing block {}", i, b));
            }
            if let Some(parent) = region.parent {
                if parent.index() >= self.regions.len() || parent == region.id {
                    return Err(format!("region {} has an invalid parent", i));
                }
            }
            for handler in &region.handlers {
                match self.regions.get(handler.index()) {
                    Some(h) if region.kind == RegionKind::Try && h.kind != RegionKind::Try => {}
                    _ => {
                        return Err(format!(
                            "region {} lists invalid handler {}",
                            i, handler.0
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blocks() -> ControlFlowGraph {
        let mut b0 = BasicBlock::new(BlockId(0));
        b0.successors.push(Edge::new(BlockId(1), EdgeKind::Normal));
        ControlFlowGraph {
            blocks: vec![b0, BasicBlock::new(BlockId(1))],
            entry: BlockId(0),
            exit: BlockId(1),
            regions: vec![],
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(two_blocks().validate().is_ok());
    }

    #[test]
    fn test_validate_dangling_edge() {
        let mut cfg = two_blocks();
        cfg.blocks[1]
            .successors
            .push(Edge::new(BlockId(9), EdgeKind::Normal));
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("B9"));
    }

    #[test]
    fn test_validate_missing_exit() {
        let mut cfg = two_blocks();
        cfg.exit = BlockId(5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_bad_handler() {
        let mut cfg = two_blocks();
        cfg.regions.push(ExceptionRegion {
            id: RegionId(0),
            kind: RegionKind::Try,
            blocks: vec![BlockId(0)],
            entry: BlockId(0),
            handlers: vec![RegionId(3)],
            catches_all: false,
            parent: None,
        });
        assert!(cfg.validate().is_err());
    }
}
