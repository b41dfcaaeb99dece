//! Points-to Analysis
//!
//! Flow-sensitive may-alias dataflow over the procedure CFG:
//! - Abstract locations per (creation operation, call context)
//! - Symbol and heap-slot points-to sets with reserved Null/Unknown members
//! - Strong updates for locals and singleton receivers, weak updates otherwise
//!
//! # References
//! - Hind (2001): "Pointer Analysis: Haven't We Solved This Problem Yet?"
//! - Choi et al. (1999): "Efficient and Precise Modeling of Exceptions"

pub mod application;
pub mod domain;

pub use application::PointsToTransfer;
pub use domain::*;
