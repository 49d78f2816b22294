//! Abuse rule engine
//!
//! Evaluates every raw relationship edge against the static rule tables and
//! expands matches into derived capability edges. Four independent raw-edge
//! partitions (permission grants, directory roles, ownership, Azure RBAC);
//! order between partitions never matters.
//!
//! Re-running derivation over the same raw-edge set produces byte-identical
//! derived-edge identifiers, so the sink can treat derivation as idempotent
//! upsert rather than append.

use super::tables::RuleTables;
use crate::model::{DerivedEdge, RawEdge};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw edge types the engine evaluates.
pub const APP_ROLE_ASSIGNMENT: &str = "appRoleAssignment";
pub const DIRECTORY_ROLE: &str = "directoryRole";
pub const APP_OWNER: &str = "appOwner";
pub const SP_OWNER: &str = "spOwner";
pub const GROUP_OWNER: &str = "groupOwner";
pub const AZURE_RBAC: &str = "azureRbac";
pub const AZURE_ROLE_ASSIGNMENT: &str = "azureRoleAssignment";

/// Virtual target type used when a capability reaches a scope rather than a
/// concrete entity (e.g. "allApps", "tenant").
pub const VIRTUAL_SCOPE: &str = "virtualScope";

/// Edge property holding the granted app-role permission id.
const APP_ROLE_ID: &str = "appRoleId";
/// Edge property holding the directory-role template id.
const TARGET_ROLE_TEMPLATE_ID: &str = "targetRoleTemplateId";
/// Edge property holding the Azure role definition resource path.
const TARGET_ROLE_DEFINITION_ID: &str = "targetRoleDefinitionId";
/// Edge property holding the Azure RBAC assignment scope.
const SCOPE: &str = "scope";

/// Per-category derived-edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationCounts {
    pub permission_grants: u64,
    pub directory_roles: u64,
    pub ownership: u64,
    pub azure_rbac: u64,
}

/// Result of one derivation run.
#[derive(Debug, Clone, Default)]
pub struct Derivation {
    pub edges: Vec<DerivedEdge>,
    /// Malformed edges dropped (missing the field their rule partition needs)
    pub skipped: u64,
    pub counts: DerivationCounts,
}

impl Derivation {
    pub fn total(&self) -> usize {
        self.edges.len()
    }
}

/// Expand raw edges into derived capability edges.
///
/// Edge types outside the four rule partitions pass through silently, as do
/// edges whose lookup key has no rule (rule-table miss is not an error).
/// A malformed edge is skipped with a warning; it never aborts the batch.
pub fn derive_abuse_edges(raw_edges: &[RawEdge], rules: &RuleTables) -> Derivation {
    let mut derivation = Derivation::default();

    for edge in raw_edges {
        match edge.edge_type.as_str() {
            APP_ROLE_ASSIGNMENT => derive_permission_grant(edge, rules, &mut derivation),
            DIRECTORY_ROLE => derive_directory_role(edge, rules, &mut derivation),
            APP_OWNER | SP_OWNER | GROUP_OWNER => derive_ownership(edge, rules, &mut derivation),
            AZURE_RBAC | AZURE_ROLE_ASSIGNMENT => derive_azure_rbac(edge, rules, &mut derivation),
            _ => {}
        }
    }

    derivation
}

fn derive_permission_grant(edge: &RawEdge, rules: &RuleTables, out: &mut Derivation) {
    let Some(app_role_id) = edge.property_str(APP_ROLE_ID) else {
        warn!(edge_id = %edge.object_id, "appRoleAssignment edge missing appRoleId");
        out.skipped += 1;
        return;
    };
    if let Some(rule) = rules.graph_permissions.get(app_role_id) {
        out.edges.push(DerivedEdge::from_raw(
            edge,
            &rule.abuse_edge,
            &rule.target_scope,
            VIRTUAL_SCOPE,
            rule.severity,
            &rule.description,
        ));
        out.counts.permission_grants += 1;
    }
}

fn derive_directory_role(edge: &RawEdge, rules: &RuleTables, out: &mut Derivation) {
    let Some(template_id) = edge.property_str(TARGET_ROLE_TEMPLATE_ID) else {
        warn!(edge_id = %edge.object_id, "directoryRole edge missing targetRoleTemplateId");
        out.skipped += 1;
        return;
    };
    if let Some(rule) = rules.directory_roles.get(template_id) {
        // A role may grant several distinct capabilities; one derived edge
        // per capability, all pointing back at the same raw edge.
        for abuse_edge in &rule.abuse_edges {
            out.edges.push(DerivedEdge::from_raw(
                edge,
                abuse_edge,
                "tenant",
                VIRTUAL_SCOPE,
                rule.severity,
                format!("Granted by directory role template {}", template_id),
            ));
            out.counts.directory_roles += 1;
        }
    }
}

fn derive_ownership(edge: &RawEdge, rules: &RuleTables, out: &mut Derivation) {
    let Some(rule) = rules.ownership_abuse.get(&edge.edge_type) else {
        return;
    };
    out.edges.push(DerivedEdge::from_raw(
        edge,
        &rule.abuse_edge,
        &edge.target_id,
        &edge.target_type,
        rule.severity,
        format!("Owns the target via {}", edge.edge_type),
    ));
    out.counts.ownership += 1;

    // The one conditional rule: ownership of a role-assignable group also
    // grants role assignment through the group.
    if let Some(conditional) = &rule.conditional {
        if edge.property_bool(&conditional.flag_field) == Some(true) {
            out.edges.push(DerivedEdge::from_raw(
                edge,
                &conditional.abuse_edge,
                &edge.target_id,
                &edge.target_type,
                conditional.severity,
                format!("Owns a role-assignable group via {}", edge.edge_type),
            ));
            out.counts.ownership += 1;
        }
    }
}

fn derive_azure_rbac(edge: &RawEdge, rules: &RuleTables, out: &mut Derivation) {
    let Some(definition_id) = edge.property_str(TARGET_ROLE_DEFINITION_ID) else {
        warn!(edge_id = %edge.object_id, "azure RBAC edge missing targetRoleDefinitionId");
        out.skipped += 1;
        return;
    };
    // The role definition id is path-shaped; the GUID is its tail segment.
    let Some(role_guid) = definition_id.rsplit('/').next().filter(|s| !s.is_empty()) else {
        warn!(edge_id = %edge.object_id, "azure RBAC edge has empty role definition id");
        out.skipped += 1;
        return;
    };
    let Some(rule) = rules.azure_rbac_abuse.get(role_guid) else {
        return;
    };
    // Azure capabilities bind to the assignment's concrete scope, not a
    // virtual one.
    let Some(scope) = edge.property_str(SCOPE) else {
        warn!(edge_id = %edge.object_id, "azure RBAC edge missing scope");
        out.skipped += 1;
        return;
    };
    out.edges.push(DerivedEdge::from_raw(
        edge,
        &rule.abuse_edge,
        scope,
        "azureScope",
        rule.severity,
        &rule.description,
    ));
    out.counts.azure_rbac += 1;
}
