//! Error types for dispose-flow
//!
//! Provides unified error handling across the crate.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for dispose-flow operations
#[derive(Debug, Error)]
pub enum DisposeFlowError {
    /// Cooperative cancellation was requested
    #[error("Analysis cancelled")]
    Cancelled,

    /// Dangling block/region reference, missing entry or exit
    #[error("Malformed CFG in '{procedure}': {reason}")]
    MalformedCfg { procedure: String, reason: String },

    /// Worklist exceeded its visit bound
    #[error("Fixpoint did not converge for '{procedure}' after {visits} block visits")]
    NonConvergence { procedure: String, visits: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DisposeFlowError {
    /// Create a malformed CFG error
    pub fn malformed(procedure: impl Into<String>, reason: impl Into<String>) -> Self {
        DisposeFlowError::MalformedCfg {
            procedure: procedure.into(),
            reason: reason.into(),
        }
    }

    /// Create a non-convergence error
    pub fn non_convergence(procedure: impl Into<String>, visits: usize) -> Self {
        DisposeFlowError::NonConvergence {
            procedure: procedure.into(),
            visits,
        }
    }

    /// Whether the error came from cancellation (not a failure of the procedure)
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DisposeFlowError::Cancelled)
    }
}

/// Result type alias for dispose-flow operations
pub type Result<T> = std::result::Result<T, DisposeFlowError>;
