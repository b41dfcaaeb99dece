//! Flow graph infrastructure

mod builder;
mod structure;
mod type_catalog;

pub use builder::ProcedureBuilder;
pub use structure::{CfgStructure, ExceptionTarget};
pub use type_catalog::DisposableTypeSet;
