//! Dangerous-capability rule tables
//!
//! Four independent lookup tables mapping dangerous permission identifiers,
//! privileged directory roles, ownership edge types, and privileged Azure
//! RBAC roles to the capability edges they grant. Pure reference data:
//! loaded once at process start (YAML file or built-in defaults), read-only
//! during evaluation. Keeping the mappings as data rather than control flow
//! keeps the engine rule-count-agnostic and testable by swapping the table.

use crate::model::Severity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading a rule-table file
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("I/O error reading rule table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rule table parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type RuleResult<T> = Result<T, RuleError>;

/// Privilege tier of a directory role. Tier 0 amounts to full tenant
/// compromise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleTier {
    Tier0,
    Tier1,
    Tier2,
}

/// Rule for a dangerous Graph app-role permission (keyed by permission id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    /// Capability edge type to emit
    pub abuse_edge: String,
    /// Virtual scope the capability reaches (e.g. "allApps")
    pub target_scope: String,
    pub severity: Severity,
    pub description: String,
}

/// Rule for a privileged directory role (keyed by role template id).
/// One role may grant several distinct capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRule {
    pub abuse_edges: Vec<String>,
    pub severity: Severity,
    pub tier: RoleTier,
}

/// Sub-rule emitted only when a boolean flag on the edge's target is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    /// Edge property checked (e.g. "targetIsAssignableToRole")
    pub flag_field: String,
    pub abuse_edge: String,
    pub severity: Severity,
}

/// Rule for an ownership edge type (keyed by edge type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRule {
    pub abuse_edge: String,
    pub severity: Severity,
    /// At most one table entry carries this; groupOwner's role-assignable
    /// escalation. A special case, not a pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<ConditionalRule>,
}

/// Rule for a privileged Azure RBAC role (keyed by role definition GUID).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureRule {
    pub abuse_edge: String,
    pub severity: Severity,
    pub description: String,
}

/// The complete static rule set for abuse-edge derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleTables {
    pub graph_permissions: IndexMap<String, PermissionRule>,
    pub directory_roles: IndexMap<String, RoleRule>,
    pub ownership_abuse: IndexMap<String, OwnershipRule>,
    pub azure_rbac_abuse: IndexMap<String, AzureRule>,
}

impl RuleTables {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> RuleResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse from YAML text
    pub fn from_yaml_str(text: &str) -> RuleResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn is_empty(&self) -> bool {
        self.graph_permissions.is_empty()
            && self.directory_roles.is_empty()
            && self.ownership_abuse.is_empty()
            && self.azure_rbac_abuse.is_empty()
    }

    /// The built-in reference rule set: well-known dangerous Graph app-role
    /// permissions, tier-0/tier-1 directory roles, ownership escalations,
    /// and privileged Azure RBAC roles.
    pub fn builtin() -> Self {
        let mut tables = RuleTables::default();

        // --- Dangerous Graph app-role permissions -------------------------
        tables.graph_permissions.insert(
            "9e3f62cf-ca93-4989-b6ce-bf83c28f9fe8".to_string(),
            PermissionRule {
                abuse_edge: "canGrantAnyRole".to_string(),
                target_scope: "allRoles".to_string(),
                severity: Severity::Critical,
                description: "RoleManagement.ReadWrite.Directory: can promote any principal to any directory role".to_string(),
            },
        );
        tables.graph_permissions.insert(
            "06b708a9-e830-4db3-a914-8e69da51d44f".to_string(),
            PermissionRule {
                abuse_edge: "canGrantAnyPermission".to_string(),
                target_scope: "allServicePrincipals".to_string(),
                severity: Severity::Critical,
                description: "AppRoleAssignment.ReadWrite.All: can grant itself or others any app role".to_string(),
            },
        );
        tables.graph_permissions.insert(
            "1bfefb4e-e0b5-418b-a88f-73c46d2cc8e9".to_string(),
            PermissionRule {
                abuse_edge: "canAddSecretToAnyApp".to_string(),
                target_scope: "allApps".to_string(),
                severity: Severity::Critical,
                description: "Application.ReadWrite.All: can add credentials to any application".to_string(),
            },
        );
        tables.graph_permissions.insert(
            "19dbc75e-c2e2-444c-a770-ec69d8559fc7".to_string(),
            PermissionRule {
                abuse_edge: "canModifyDirectory".to_string(),
                target_scope: "directory".to_string(),
                severity: Severity::High,
                description: "Directory.ReadWrite.All: broad directory write access".to_string(),
            },
        );
        tables.graph_permissions.insert(
            "62a82d76-70ea-41e2-9197-370581804d09".to_string(),
            PermissionRule {
                abuse_edge: "canModifyAnyGroup".to_string(),
                target_scope: "allGroups".to_string(),
                severity: Severity::High,
                description: "Group.ReadWrite.All: can rewrite membership of any non-role group".to_string(),
            },
        );
        tables.graph_permissions.insert(
            "dbaae8cf-10b5-4b86-a4a1-f871c94c6695".to_string(),
            PermissionRule {
                abuse_edge: "canModifyAnyGroupMembership".to_string(),
                target_scope: "allGroups".to_string(),
                severity: Severity::High,
                description: "GroupMember.ReadWrite.All: can add members to any non-role group".to_string(),
            },
        );

        // --- Privileged directory roles (by role template id) -------------
        tables.directory_roles.insert(
            "62e90394-69f5-4237-9190-012177145e10".to_string(),
            RoleRule {
                abuse_edges: vec!["isGlobalAdmin".to_string(), "canGrantAnyRole".to_string()],
                severity: Severity::Critical,
                tier: RoleTier::Tier0,
            },
        );
        tables.directory_roles.insert(
            "e8611ab8-c189-46e8-94e1-60213ab1f814".to_string(),
            RoleRule {
                abuse_edges: vec!["canGrantAnyRole".to_string()],
                severity: Severity::Critical,
                tier: RoleTier::Tier0,
            },
        );
        tables.directory_roles.insert(
            "7be44c8a-adaf-4e2a-84d6-ab2649e08a13".to_string(),
            RoleRule {
                abuse_edges: vec!["canResetAnyPassword".to_string()],
                severity: Severity::Critical,
                tier: RoleTier::Tier0,
            },
        );
        tables.directory_roles.insert(
            "9b895d92-2cd3-44c7-9d02-a6ac2d5ea5c3".to_string(),
            RoleRule {
                abuse_edges: vec![
                    "canAddSecretToAnyApp".to_string(),
                    "canModifyAnyAppRegistration".to_string(),
                ],
                severity: Severity::Critical,
                tier: RoleTier::Tier0,
            },
        );
        tables.directory_roles.insert(
            "158c047a-c907-4556-b7ef-446551a6b5f7".to_string(),
            RoleRule {
                abuse_edges: vec!["canAddSecretToAnyApp".to_string()],
                severity: Severity::Critical,
                tier: RoleTier::Tier0,
            },
        );
        tables.directory_roles.insert(
            "fe930be7-5e62-47db-91af-98c3a49a38b1".to_string(),
            RoleRule {
                abuse_edges: vec!["canResetNonAdminPasswords".to_string()],
                severity: Severity::High,
                tier: RoleTier::Tier1,
            },
        );
        tables.directory_roles.insert(
            "fdd7a751-b60b-444a-984c-02652fe8fa1c".to_string(),
            RoleRule {
                abuse_edges: vec!["canModifyAnyGroup".to_string()],
                severity: Severity::High,
                tier: RoleTier::Tier1,
            },
        );
        tables.directory_roles.insert(
            "3a2c62db-5318-420d-8d74-23affee5d9d5".to_string(),
            RoleRule {
                abuse_edges: vec!["canManageDevices".to_string()],
                severity: Severity::High,
                tier: RoleTier::Tier1,
            },
        );

        // --- Ownership escalations ----------------------------------------
        tables.ownership_abuse.insert(
            "appOwner".to_string(),
            OwnershipRule {
                abuse_edge: "canAddSecretToApp".to_string(),
                severity: Severity::High,
                conditional: None,
            },
        );
        tables.ownership_abuse.insert(
            "spOwner".to_string(),
            OwnershipRule {
                abuse_edge: "canAddSecretToSp".to_string(),
                severity: Severity::High,
                conditional: None,
            },
        );
        tables.ownership_abuse.insert(
            "groupOwner".to_string(),
            OwnershipRule {
                abuse_edge: "canModifyGroupMembership".to_string(),
                severity: Severity::Medium,
                conditional: Some(ConditionalRule {
                    flag_field: "targetIsAssignableToRole".to_string(),
                    abuse_edge: "canAssignRolesViaGroup".to_string(),
                    severity: Severity::Critical,
                }),
            },
        );

        // --- Privileged Azure RBAC roles (by role definition GUID) --------
        tables.azure_rbac_abuse.insert(
            "8e3af657-a8ff-443c-a75c-2fe8c4bcb635".to_string(),
            AzureRule {
                abuse_edge: "ownsAzureScope".to_string(),
                severity: Severity::Critical,
                description: "Owner: full control of the scope including role assignments".to_string(),
            },
        );
        tables.azure_rbac_abuse.insert(
            "18d7d88d-d35e-4fb5-a5c3-7773c20a72d9".to_string(),
            AzureRule {
                abuse_edge: "canAssignAzureRoles".to_string(),
                severity: Severity::Critical,
                description: "User Access Administrator: can grant any role on the scope".to_string(),
            },
        );
        tables.azure_rbac_abuse.insert(
            "b24988ac-6180-42a0-ab88-20f7382dd24c".to_string(),
            AzureRule {
                abuse_edge: "canModifyAzureResources".to_string(),
                severity: Severity::High,
                description: "Contributor: can modify all resources in the scope".to_string(),
            },
        );

        tables
    }
}
