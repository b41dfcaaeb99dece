//! Dispose analysis feature
//!
//! - domain: dispose-value lattice, combined state, verdicts
//! - application: session, transfer functions, verdict collection
//! - infrastructure: ownership rule table

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{AnalysisSession, AnalysisStats, DisposeTransfer, Frame, VerdictCollector};
pub use domain::*;
pub use infrastructure::{OwnershipEffect, OwnershipRule, OwnershipRules};
