//! Entity records — the unit of collection and diffing
//!
//! Every collected object (user, group, service principal, subscription,
//! policy, ...) is normalized into an `EntityRecord`: three required core
//! fields plus an open extension bag. The bag is flattened on the wire so a
//! record round-trips as the flat JSON object the collectors emit.

use super::property::{PropertyMap, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single collected entity: stable identity, type discriminator,
/// collection time, and everything else as loose fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Stable object identifier, unique within its entity type and partition
    pub object_id: String,

    /// Type discriminator (principalType / resourceType / edgeType /
    /// policyType — entity types share containers and are told apart by this)
    pub entity_type: String,

    /// When the collection run observed this record
    pub collection_timestamp: DateTime<Utc>,

    /// Open extension bag for all remaining fields
    #[serde(flatten)]
    pub fields: PropertyMap,
}

impl EntityRecord {
    /// Create a record with an empty field bag
    pub fn new(
        object_id: impl Into<String>,
        entity_type: impl Into<String>,
        collection_timestamp: DateTime<Utc>,
    ) -> Self {
        EntityRecord {
            object_id: object_id.into(),
            entity_type: entity_type.into(),
            collection_timestamp,
            fields: PropertyMap::new(),
        }
    }

    /// Set a field value
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Get a field value
    pub fn get_field(&self, key: &str) -> Option<&PropertyValue> {
        self.fields.get(key)
    }

    /// Get a field as a string, if present and a string
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(PropertyValue::as_str)
    }

    /// Get a field as a boolean, if present and a boolean
    pub fn field_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(PropertyValue::as_boolean)
    }

    /// Check if a field exists
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of fields in the extension bag
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
