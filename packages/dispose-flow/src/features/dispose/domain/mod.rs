//! Dispose domain models

mod dispose_state;
mod dispose_value;
mod verdict;

pub use dispose_state::{AnalysisState, DisposeStateMap};
pub use dispose_value::{DisposeState, DisposeValue, Outcomes};
pub use verdict::{Classification, DiagnosticKind, PathKind, Verdict};
