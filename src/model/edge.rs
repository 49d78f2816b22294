//! Raw and derived relationship edges
//!
//! A raw edge is a collected directed relationship (membership, ownership,
//! role assignment, permission grant). A derived edge is a synthetic
//! capability edge the rule engine infers from a raw edge.
//!
//! Edge identity is deterministic: the object id is a pure function of
//! (sourceId, targetId, edgeType). Re-collecting or re-deriving the same
//! relationship therefore upserts instead of duplicating.

use super::property::{PropertyMap, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Compute the deterministic object id for an edge.
///
/// SHA-256 over `sourceId|targetId|edgeType`, hex-encoded. The separator
/// keeps `("ab","c")` and `("a","bc")` from colliding.
pub fn edge_object_id(source_id: &str, target_id: &str, edge_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"|");
    hasher.update(target_id.as_bytes());
    hasher.update(b"|");
    hasher.update(edge_type.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Severity of a derived capability, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// A collected directed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEdge {
    /// Deterministic identifier, see [`edge_object_id`]
    pub object_id: String,

    /// Relationship type (e.g. "memberOf", "appRoleAssignment", "groupOwner")
    pub edge_type: String,

    /// Edge goes FROM this entity
    pub source_id: String,

    /// Entity type of the source
    pub source_type: String,

    /// Edge goes TO this entity
    pub target_id: String,

    /// Entity type of the target
    pub target_type: String,

    /// Tombstone marker: the relationship was observed to have disappeared
    #[serde(default)]
    pub deleted: bool,

    /// When the collection run observed this edge
    pub collection_timestamp: DateTime<Utc>,

    /// Denormalized optional fields (display names, rule-lookup fields such
    /// as appRoleId / targetRoleTemplateId / targetRoleDefinitionId / scope)
    #[serde(flatten)]
    pub properties: PropertyMap,
}

impl RawEdge {
    /// Create a raw edge; the object id is computed, never supplied.
    pub fn new(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        target_id: impl Into<String>,
        target_type: impl Into<String>,
        edge_type: impl Into<String>,
        collection_timestamp: DateTime<Utc>,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let edge_type = edge_type.into();
        let object_id = edge_object_id(&source_id, &target_id, &edge_type);
        RawEdge {
            object_id,
            edge_type,
            source_id,
            source_type: source_type.into(),
            target_id,
            target_type: target_type.into(),
            deleted: false,
            collection_timestamp,
            properties: PropertyMap::new(),
        }
    }

    /// Mark this edge as a tombstone
    pub fn tombstoned(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Set a denormalized property
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Get a denormalized property as a string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_str)
    }

    /// Get a denormalized property as a boolean
    pub fn property_bool(&self, key: &str) -> Option<bool> {
        self.properties.get(key).and_then(PropertyValue::as_boolean)
    }
}

/// A synthetic capability edge inferred from a raw edge by the rule engine.
///
/// For a given (raw edge, rule) pair the object id is always the same string:
/// deriving twice from the same inputs produces the identical edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEdge {
    /// Deterministic identifier over (sourceId, resolved targetId, edgeType)
    pub object_id: String,

    /// Capability type (e.g. "canAddSecretToAnyApp", "isGlobalAdmin")
    pub edge_type: String,

    pub source_id: String,
    pub source_type: String,

    /// Concrete target, or a virtual scope such as "allApps"
    pub target_id: String,
    pub target_type: String,

    /// Tombstone propagated from the raw edge
    #[serde(default)]
    pub deleted: bool,

    pub collection_timestamp: DateTime<Utc>,

    /// Edge type of the raw edge this capability was derived from
    pub derived_from: String,

    /// Object id of the raw edge this capability was derived from
    pub derived_from_edge_id: String,

    pub severity: Severity,
    pub description: String,

    /// Display fields copied through verbatim from the raw edge
    #[serde(flatten)]
    pub properties: PropertyMap,
}

/// Denormalized display fields the rule engine copies through when present.
pub const DISPLAY_FIELDS: &[&str] = &[
    "sourceDisplayName",
    "sourceUserPrincipalName",
    "sourceAppId",
    "targetDisplayName",
];

impl DerivedEdge {
    /// Build a derived edge from its raw edge, resolved target, and rule data.
    pub fn from_raw(
        raw: &RawEdge,
        abuse_edge_type: impl Into<String>,
        target_id: impl Into<String>,
        target_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let edge_type = abuse_edge_type.into();
        let target_id = target_id.into();
        let object_id = edge_object_id(&raw.source_id, &target_id, &edge_type);

        let mut properties = PropertyMap::new();
        for key in DISPLAY_FIELDS {
            if let Some(value) = raw.properties.get(*key) {
                properties.insert((*key).to_string(), value.clone());
            }
        }

        DerivedEdge {
            object_id,
            edge_type,
            source_id: raw.source_id.clone(),
            source_type: raw.source_type.clone(),
            target_id,
            target_type: target_type.into(),
            deleted: raw.deleted,
            collection_timestamp: raw.collection_timestamp,
            derived_from: raw.edge_type.clone(),
            derived_from_edge_id: raw.object_id.clone(),
            severity,
            description: description.into(),
            properties,
        }
    }
}
