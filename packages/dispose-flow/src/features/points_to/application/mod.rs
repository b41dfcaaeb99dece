//! Points-to transfer functions

mod transfer;

pub use transfer::{NullRefinement, PointsToTransfer};
