//! Dispose analysis use cases

mod session;
mod transfer;
mod verdicts;

pub use session::{AnalysisSession, AnalysisStats, Frame};
pub use transfer::{BlockOutput, DisposeTransfer, LostReference};
pub use verdicts::VerdictCollector;
