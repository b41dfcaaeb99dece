//! Configuration System
//!
//! Two entry points, same keys:
//! - String options (host build system): [`AnalysisConfig::from_options`]
//! - Versioned YAML file: [`AnalysisConfig::from_yaml_file`]
//!
//! # Examples
//!
//! ```rust
//! use dispose_flow::config::{AnalysisConfig, DisposeAnalysisKind};
//!
//! let config = AnalysisConfig::from_options([
//!     ("dotnet_code_quality.CA2000.dispose_analysis_kind", "AllPaths"),
//!     ("excluded_symbol_names", "Generated*"),
//! ]);
//! assert_eq!(config.analysis_kind, DisposeAnalysisKind::AllPaths);
//! ```

pub mod analysis_config;
pub mod error;
pub mod io;
pub mod symbol_filter;

// Re-exports
pub use analysis_config::{AnalysisConfig, DisposeAnalysisKind, InterproceduralKind, OPTION_KEYS};
pub use error::{ConfigError, ConfigResult};
pub use io::{ConfigFileV1, SUPPORTED_VERSIONS};
pub use symbol_filter::{NamePattern, PatternTarget, SymbolExclusions, SymbolPattern};
