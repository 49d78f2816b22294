//! Abuse-edge derivation: static rule tables and the rule engine

pub mod engine;
pub mod tables;

pub use engine::{derive_abuse_edges, Derivation, DerivationCounts};
pub use tables::{
    AzureRule, ConditionalRule, OwnershipRule, PermissionRule, RoleRule, RoleTier, RuleError,
    RuleResult, RuleTables,
};
