//! Flow graph feature
//!
//! Language-neutral procedure model consumed by the engine:
//! - domain: operations, basic blocks, exception regions, procedures
//! - ports: disposable-type capability
//! - infrastructure: in-memory builder, structure analysis (RPO, loops, exception targets)

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::*;
pub use infrastructure::{CfgStructure, DisposableTypeSet, ExceptionTarget, ProcedureBuilder};
pub use ports::DisposableTypes;
