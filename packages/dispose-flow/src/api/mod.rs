//! Public API
//!
//! Entry points over an immutable [`Program`](crate::Program):
//! - [`analyze_procedure`]: verdicts for one procedure
//! - [`analyze_program`]: every procedure, failures isolated per procedure

mod analyze;
mod cancellation;
mod report;

pub use analyze::{analyze_procedure, analyze_program};
pub use cancellation::CancellationToken;
pub use report::{AnalysisOutcome, ProcedureAnalysis, ProcedureReport, ProgramReport, SkipReason};
