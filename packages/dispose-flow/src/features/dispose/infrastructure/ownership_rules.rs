/*
 * Ownership Rule Table
 *
 * Data-driven replacement for framework special cases:
 * - callee pattern → ownership effects (transfer, new instance, dispose, no effect)
 * - owning wrapper types that take ownership of their constructor arguments
 *
 * Rules take precedence over callee re-analysis; a call matched by a rule is
 * never treated as an unresolved call.
 */

use serde::{Deserialize, Serialize};

use crate::config::{ConfigResult, NamePattern};
use crate::features::flow_graph::domain::TypeName;

/// Effect of a matched call on ownership
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipEffect {
    /// Argument `index` is owned by the callee afterwards
    TransferArgument { index: usize },
    TransferAllArguments,
    /// The call result is a new instance owned by the caller
    ReturnsNewInstance,
    /// Out-argument `index` receives a new instance owned by the caller
    OutArgumentNewInstance { index: usize },
    /// Argument `index` is released by the callee
    DisposesArgument { index: usize },
    /// The receiver is released by the callee
    DisposesReceiver,
    /// Call has no ownership effect (arguments stay owned by the caller)
    NoEffect,
}

/// One rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnershipRule {
    /// `Namespace.Type.Name` pattern, `*` wildcards allowed
    pub callee: String,
    /// Indexed effects are written as single-key maps: `transfer_argument: { index: 1 }`
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub effects: Vec<OwnershipEffect>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: NamePattern,
    rule: OwnershipRule,
}

/// Compiled rule table
#[derive(Debug, Clone, Default)]
pub struct OwnershipRules {
    rules: Vec<CompiledRule>,
    owning_types: Vec<NamePattern>,
}

impl OwnershipRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Common library wrappers and factories
    pub fn builtin() -> Self {
        let mut rules = Self::empty();
        let owning = [
            "System.IO.StreamReader",
            "System.IO.StreamWriter",
            "System.IO.BinaryReader",
            "System.IO.BinaryWriter",
            "System.IO.BufferedStream",
            "System.IO.Compression.DeflateStream",
            "System.IO.Compression.GZipStream",
            "System.Resources.ResourceReader",
            "System.Security.Cryptography.CryptoStream",
        ];
        let factories = [
            "System.IO.File.Create",
            "System.IO.File.Open",
            "System.IO.File.OpenRead",
            "System.IO.File.OpenWrite",
            "System.IO.File.OpenText",
        ];
        for ty in owning {
            rules.owning_types.push(NamePattern::Exact(ty.to_string()));
        }
        for callee in factories {
            rules.rules.push(CompiledRule {
                pattern: NamePattern::Exact(callee.to_string()),
                rule: OwnershipRule {
                    callee: callee.to_string(),
                    effects: vec![OwnershipEffect::ReturnsNewInstance],
                },
            });
        }
        rules
    }

    pub fn add_rule(&mut self, rule: OwnershipRule) -> ConfigResult<()> {
        let pattern = NamePattern::new(&rule.callee)?;
        self.rules.push(CompiledRule { pattern, rule });
        Ok(())
    }

    pub fn add_owning_type(&mut self, pattern: &str) -> ConfigResult<()> {
        self.owning_types.push(NamePattern::new(pattern)?);
        Ok(())
    }

    pub fn with_rule(mut self, callee: &str, effects: Vec<OwnershipEffect>) -> ConfigResult<Self> {
        self.add_rule(OwnershipRule {
            callee: callee.to_string(),
            effects,
        })?;
        Ok(self)
    }

    pub fn with_owning_type(mut self, pattern: &str) -> ConfigResult<Self> {
        self.add_owning_type(pattern)?;
        Ok(self)
    }

    /// Effects of the first rule matching `callee`
    pub fn effects_for(&self, callee: &str) -> Option<&[OwnershipEffect]> {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(callee))
            .map(|r| r.rule.effects.as_slice())
    }

    /// Wrapper type that owns its constructor arguments
    pub fn takes_ownership(&self, ty: &TypeName) -> bool {
        self.owning_types.iter().any(|p| p.is_match(ty.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.owning_types.is_empty()
    }
}
