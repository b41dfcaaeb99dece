//! In-memory disposable type catalog
//!
//! Simple name-based implementation of [`DisposableTypes`] used by the CLI and
//! by tests. Entries ending in `*` match by prefix.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::features::flow_graph::domain::TypeName;
use crate::features::flow_graph::ports::DisposableTypes;

/// Type names that carry a disposable capability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisposableTypeSet {
    /// Types whose instances must be released
    #[serde(default)]
    disposable: FxHashSet<String>,
    /// Non-disposable types that may still hold a disposable instance (e.g. `object`)
    #[serde(default)]
    carriers: FxHashSet<String>,
}

impl DisposableTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.disposable.insert(name.into());
        }
        set
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.disposable.insert(name.into());
        self
    }

    pub fn with_carrier(mut self, name: impl Into<String>) -> Self {
        self.carriers.insert(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.disposable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposable.is_empty()
    }
}

fn matches_any(names: &FxHashSet<String>, ty: &str) -> bool {
    names.contains(ty)
        || names.iter().any(|n| match n.strip_suffix('*') {
            Some(prefix) => ty.starts_with(prefix),
            None => false,
        })
}

impl DisposableTypes for DisposableTypeSet {
    fn is_disposable(&self, ty: &TypeName) -> bool {
        matches_any(&self.disposable, ty.as_str())
    }

    fn may_carry_disposable(&self, ty: &TypeName) -> bool {
        self.is_disposable(ty) || matches_any(&self.carriers, ty.as_str())
    }
}
