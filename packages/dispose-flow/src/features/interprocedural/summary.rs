//! Callee outcome cache
//!
//! Memoizes the exit states of a callee re-analysis keyed by
//! (callee, call context, entry state). The key carries the full entry state,
//! so a hit is exact: two calls with the same key are guaranteed to produce
//! the same exit states.

use lru::LruCache;
use std::num::NonZeroUsize;

use super::context::CallContext;
use crate::features::dispose::domain::AnalysisState;
use crate::features::flow_graph::domain::ProcedureId;

/// Memo key of one callee analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalleeKey {
    pub callee: ProcedureId,
    pub context: CallContext,
    pub entry: AnalysisState,
}

/// Exit states of a callee analysis, in callee terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalleeExit {
    /// Normal exit (`None` if the callee never returns normally)
    pub normal: Option<AnalysisState>,
    /// Exceptions escaping the callee
    pub exceptional: Option<AnalysisState>,
}

/// LRU cache of callee exits plus the per-session analysis budget
pub struct CallOutcomeCache {
    cache: LruCache<CalleeKey, CalleeExit>,

    /// Callee fixpoint runs so far
    analyses: usize,

    hits: usize,
    misses: usize,
}

impl CallOutcomeCache {
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            analyses: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &CalleeKey) -> Option<&CalleeExit> {
        match self.cache.get(key) {
            Some(exit) => {
                self.hits += 1;
                Some(exit)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: CalleeKey, exit: CalleeExit) {
        self.cache.put(key, exit);
    }

    /// Count one callee analysis against `budget`; false when exhausted
    pub fn try_begin_analysis(&mut self, budget: usize) -> bool {
        if self.analyses >= budget {
            return false;
        }
        self.analyses += 1;
        true
    }

    pub fn analyses(&self) -> usize {
        self.analyses
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
