//! Flow graph domain models

mod cfg;
mod operation;
mod program;

pub use cfg::*;
pub use operation::*;
pub use program::*;
