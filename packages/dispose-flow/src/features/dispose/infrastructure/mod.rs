//! Dispose infrastructure

mod ownership_rules;

pub use ownership_rules::{OwnershipEffect, OwnershipRule, OwnershipRules};
