//! Configuration I/O (YAML loading)
//!
//! ```yaml
//! version: 1
//! options:
//!   dispose_analysis_kind: AllPaths
//!   max_interprocedural_method_call_chain: 2
//! ownership_rules:
//!   - callee: Acme.Pool.Rent
//!     effects: [returns_new_instance]
//! owning_types:
//!   - Acme.Wrappers.*
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::analysis_config::AnalysisConfig;
use super::error::{ConfigError, ConfigResult};
use crate::features::dispose::infrastructure::OwnershipRule;

/// Supported schema versions
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// YAML Schema v1
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    pub version: Option<u32>,

    /// String options, same keys as [`AnalysisConfig::from_options`]
    #[serde(default)]
    pub options: BTreeMap<String, serde_yaml::Value>,

    /// Appended after the built-in rules; earlier rules win
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ownership_rules: Vec<OwnershipRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owning_types: Vec<String>,

    /// Start from an empty rule table instead of the built-in one
    #[serde(default)]
    pub replace_builtin_rules: bool,
}

impl ConfigFileV1 {
    pub fn parse(yaml: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(yaml)?;
        match file.version {
            None => Err(ConfigError::MissingVersion),
            Some(v) if !SUPPORTED_VERSIONS.contains(&v) => Err(ConfigError::UnsupportedVersion {
                found: v,
                supported: SUPPORTED_VERSIONS.to_vec(),
            }),
            Some(_) => Ok(file),
        }
    }

    /// Option values as strings (YAML scalars of any type are accepted)
    pub fn string_options(&self) -> ConfigResult<Vec<(String, String)>> {
        self.options
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Sequence(items) => items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .collect::<Vec<_>>()
                        .join("|"),
                    other => {
                        return Err(ConfigError::Custom(format!(
                            "option '{}' must be a scalar, got {:?}",
                            key, other
                        )))
                    }
                };
                Ok((key.clone(), text))
            })
            .collect()
    }
}

impl AnalysisConfig {
    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let file = ConfigFileV1::parse(yaml)?;
        let mut config = AnalysisConfig::default();
        config.apply_options(file.string_options()?);

        if file.replace_builtin_rules {
            config.ownership_rules = crate::features::dispose::infrastructure::OwnershipRules::empty();
        }
        for rule in file.ownership_rules {
            config.ownership_rules.add_rule(rule)?;
        }
        for ty in &file.owning_types {
            config.ownership_rules.add_owning_type(ty)?;
        }
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}
