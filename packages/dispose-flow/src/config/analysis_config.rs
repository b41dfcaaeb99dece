//! Analysis configuration
//!
//! Built from string key/value options (keys may carry a scope prefix such as
//! `dotnet_code_quality.CA2000.`, only the last dotted segment is used) or
//! from a YAML file (see [`super::io`]). Invalid values fall back to the
//! default with a logged warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::error::{ConfigError, ConfigResult};
use super::symbol_filter::SymbolExclusions;
use crate::features::dispose::infrastructure::OwnershipRules;

/// Which paths and which severities are reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisposeAnalysisKind {
    AllPaths,
    AllPathsOnlyNotDisposed,
    #[default]
    NonExceptionPaths,
    NonExceptionPathsOnlyNotDisposed,
}

impl DisposeAnalysisKind {
    /// Exception-path verdicts are reported
    pub fn tracks_exception_paths(self) -> bool {
        matches!(
            self,
            DisposeAnalysisKind::AllPaths | DisposeAnalysisKind::AllPathsOnlyNotDisposed
        )
    }

    /// Maybe-not-disposed verdicts are reported
    pub fn reports_maybe_disposed(self) -> bool {
        matches!(
            self,
            DisposeAnalysisKind::AllPaths | DisposeAnalysisKind::NonExceptionPaths
        )
    }
}

impl FromStr for DisposeAnalysisKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allpaths" => Ok(DisposeAnalysisKind::AllPaths),
            "allpathsonlynotdisposed" => Ok(DisposeAnalysisKind::AllPathsOnlyNotDisposed),
            "nonexceptionpaths" => Ok(DisposeAnalysisKind::NonExceptionPaths),
            "nonexceptionpathsonlynotdisposed" => {
                Ok(DisposeAnalysisKind::NonExceptionPathsOnlyNotDisposed)
            }
            _ => Err(ConfigError::invalid_value(
                "dispose_analysis_kind",
                s,
                "AllPaths, AllPathsOnlyNotDisposed, NonExceptionPaths or NonExceptionPathsOnlyNotDisposed",
            )),
        }
    }
}

impl fmt::Display for DisposeAnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Callee re-analysis strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterproceduralKind {
    None,
    #[default]
    ContextSensitive,
}

impl FromStr for InterproceduralKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(InterproceduralKind::None),
            "contextsensitive" => Ok(InterproceduralKind::ContextSensitive),
            _ => Err(ConfigError::invalid_value(
                "interprocedural_analysis_kind",
                s,
                "None or ContextSensitive",
            )),
        }
    }
}

/// Recognized option keys
pub const OPTION_KEYS: &[&str] = &[
    "dispose_analysis_kind",
    "dispose_ownership_transfer_at_constructor",
    "dispose_ownership_transfer_at_method_call",
    "excluded_symbol_names",
    "interprocedural_analysis_kind",
    "max_interprocedural_method_call_chain",
    "max_interprocedural_callee_analyses",
    "max_block_visits",
];

/// Engine configuration
///
/// Read-only during analysis; shared by every procedure of a run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub analysis_kind: DisposeAnalysisKind,
    pub ownership_transfer_at_constructor: bool,
    pub ownership_transfer_at_method_call: bool,
    pub excluded_symbols: SymbolExclusions,
    pub interprocedural: InterproceduralKind,
    /// Maximum call-chain depth for callee re-analysis
    pub max_call_chain: usize,
    /// Callee analyses per analyzed procedure
    pub max_callee_analyses: usize,
    /// Entries of the per-session call outcome cache
    pub memo_capacity: usize,
    /// Block visits per fixpoint run before giving up
    pub max_block_visits: usize,
    pub ownership_rules: OwnershipRules,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_kind: DisposeAnalysisKind::default(),
            ownership_transfer_at_constructor: false,
            ownership_transfer_at_method_call: false,
            excluded_symbols: SymbolExclusions::default(),
            interprocedural: InterproceduralKind::default(),
            max_call_chain: 3,
            max_callee_analyses: 512,
            memo_capacity: 256,
            max_block_visits: 100_000,
            ownership_rules: OwnershipRules::builtin(),
        }
    }
}

impl AnalysisConfig {
    /// Build from string options; bad values warn and keep the default
    pub fn from_options<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        config.apply_options(options);
        config
    }

    /// Apply string options on top of the current values
    pub fn apply_options<I, K, V>(&mut self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in options {
            if let Err(e) = self.apply_option(key.as_ref(), value.as_ref()) {
                warn!("Ignoring configuration option: {}", e);
            }
        }
    }

    /// Apply one option; the field is untouched on error
    pub fn apply_option(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let key = key.rsplit('.').next().unwrap_or(key).trim();
        match key {
            "dispose_analysis_kind" => self.analysis_kind = value.parse()?,
            "dispose_ownership_transfer_at_constructor" => {
                self.ownership_transfer_at_constructor = parse_bool(key, value)?
            }
            "dispose_ownership_transfer_at_method_call" => {
                self.ownership_transfer_at_method_call = parse_bool(key, value)?
            }
            "excluded_symbol_names" => self.excluded_symbols = SymbolExclusions::parse(value),
            "interprocedural_analysis_kind" => self.interprocedural = value.parse()?,
            "max_interprocedural_method_call_chain" => {
                self.max_call_chain = parse_count(key, value)?
            }
            "max_interprocedural_callee_analyses" => {
                self.max_callee_analyses = parse_count(key, value)?
            }
            "max_block_visits" => self.max_block_visits = parse_count(key, value)?.max(1),
            _ => return Err(ConfigError::unknown_option_with_suggestion(key, OPTION_KEYS)),
        }
        Ok(())
    }

    pub fn with_analysis_kind(mut self, kind: DisposeAnalysisKind) -> Self {
        self.analysis_kind = kind;
        self
    }

    pub fn with_interprocedural(mut self, kind: InterproceduralKind) -> Self {
        self.interprocedural = kind;
        self
    }

    pub fn with_max_call_chain(mut self, depth: usize) -> Self {
        self.max_call_chain = depth;
        self
    }

    pub fn with_ownership_rules(mut self, rules: OwnershipRules) -> Self {
        self.ownership_rules = rules;
        self
    }

    pub fn with_excluded_symbols(mut self, patterns: &str) -> Self {
        self.excluded_symbols = SymbolExclusions::parse(patterns);
        self
    }

    pub fn interprocedural_enabled(&self) -> bool {
        self.interprocedural == InterproceduralKind::ContextSensitive
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::invalid_value(key, value, "true or false")),
    }
}

fn parse_count(key: &str, value: &str) -> ConfigResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::invalid_value(key, value, "a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::QualifiedName;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.analysis_kind, DisposeAnalysisKind::NonExceptionPaths);
        assert_eq!(config.interprocedural, InterproceduralKind::ContextSensitive);
        assert_eq!(config.max_call_chain, 3);
        assert!(!config.ownership_transfer_at_constructor);
        assert!(!config.ownership_transfer_at_method_call);
        assert!(config.excluded_symbols.is_empty());
    }

    #[test]
    fn test_scoped_keys() {
        let config = AnalysisConfig::from_options([
            ("dotnet_code_quality.CA2000.dispose_analysis_kind", "AllPathsOnlyNotDisposed"),
            ("dispose_ownership_transfer_at_method_call", "TRUE"),
            ("dotnet_code_quality.interprocedural_analysis_kind", "None"),
            ("max_interprocedural_method_call_chain", "5"),
            ("excluded_symbol_names", "M:Acme.C.Run|Helper*"),
        ]);
        assert_eq!(config.analysis_kind, DisposeAnalysisKind::AllPathsOnlyNotDisposed);
        assert!(config.ownership_transfer_at_method_call);
        assert_eq!(config.interprocedural, InterproceduralKind::None);
        assert_eq!(config.max_call_chain, 5);
        assert!(config
            .excluded_symbols
            .is_excluded(&QualifiedName::new("Acme", "C", "Run")));
        assert!(config
            .excluded_symbols
            .is_excluded(&QualifiedName::new("Acme", "C", "HelperOpen")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = AnalysisConfig::from_options([
            ("dispose_analysis_kind", "Sometimes"),
            ("max_interprocedural_method_call_chain", "-1"),
            ("dispose_ownership_transfer_at_constructor", "yes"),
            ("no_such_option", "1"),
        ]);
        assert_eq!(config.analysis_kind, DisposeAnalysisKind::NonExceptionPaths);
        assert_eq!(config.max_call_chain, 3);
        assert!(!config.ownership_transfer_at_constructor);
    }

    #[test]
    fn test_apply_option_errors() {
        let mut config = AnalysisConfig::default();
        let err = config
            .apply_option("interprocedural_analysis_knd", "None")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
        assert!(err.to_string().contains("interprocedural_analysis_kind"));
    }

    #[test]
    fn test_kind_flags() {
        assert!(DisposeAnalysisKind::AllPaths.tracks_exception_paths());
        assert!(DisposeAnalysisKind::AllPaths.reports_maybe_disposed());
        assert!(!DisposeAnalysisKind::NonExceptionPathsOnlyNotDisposed.reports_maybe_disposed());
        assert!(!DisposeAnalysisKind::NonExceptionPaths.tracks_exception_paths());
    }
}
