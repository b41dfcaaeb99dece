//! Shared test utilities
//!
//! - fixtures:   disposable type catalog, names, analysis runners
//! - assertions: verdict checks with descriptive failure messages

#![allow(dead_code)]

mod assertions;
mod fixtures;

pub use assertions::*;
pub use fixtures::*;
