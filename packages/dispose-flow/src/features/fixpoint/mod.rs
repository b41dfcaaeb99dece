//! Fixpoint scheduling over lane-split block states

mod scheduler;

pub use scheduler::{FixpointResult, FixpointScheduler, Lane};
