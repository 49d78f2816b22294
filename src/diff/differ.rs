//! Snapshot differ
//!
//! Compares the previous known state of an entity collection against a newly
//! collected full snapshot and partitions every entity into exactly one of
//! {new, modified, deleted, unchanged}. Matching is by `objectId` only.
//!
//! Deletion is detected by absence: collection always produces a full
//! snapshot per entity type, so an entity present in the previous state but
//! missing from the current snapshot has been deleted.

use crate::model::{EntityRecord, PropertyValue};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Which fields participate in change detection, and which of those are
/// order-insensitive multisets.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Ordered list of field names compared for modification detection
    pub compare_fields: Vec<String>,

    /// Subset of `compare_fields` compared as order-insensitive multisets
    pub array_fields: HashSet<String>,
}

impl DiffOptions {
    pub fn new(compare_fields: Vec<String>) -> Self {
        DiffOptions {
            compare_fields,
            array_fields: HashSet::new(),
        }
    }

    pub fn with_array_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.array_fields = fields.into_iter().collect();
        self
    }
}

/// Before/after values for one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub old: Option<PropertyValue>,
    pub new: Option<PropertyValue>,
}

/// A modified entity: its current record plus per-field before/after deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedEntity {
    pub record: EntityRecord,
    pub deltas: IndexMap<String, FieldDelta>,
}

/// Partitioned result of one differ run.
///
/// Every entity id in previous ∪ current lands in exactly one partition.
/// Iteration order within a partition is insignificant.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub new: Vec<EntityRecord>,
    pub modified: Vec<ModifiedEntity>,
    /// The previous-state records of entities absent from the current snapshot
    pub deleted: Vec<EntityRecord>,
    pub unchanged: Vec<EntityRecord>,
    /// Current records dropped for missing/empty objectId
    pub skipped: u64,
    /// Current records superseded by a later record with the same objectId
    pub duplicates: u64,
}

impl DiffResult {
    /// Total entities classified (excludes skipped and duplicates)
    pub fn total(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len() + self.unchanged.len()
    }
}

/// Canonical comparison form of a field value.
///
/// Arrays flagged order-insensitive are canonicalized by serializing each
/// element and sorting, so reordering alone never counts as a change.
fn canonical_form(value: &PropertyValue, order_insensitive: bool) -> String {
    if order_insensitive {
        if let PropertyValue::Array(items) = value {
            let mut parts: Vec<String> = items
                .iter()
                .map(|item| serde_json::to_string(item).unwrap_or_default())
                .collect();
            parts.sort_unstable();
            return format!("[{}]", parts.join(","));
        }
    }
    serde_json::to_string(value).unwrap_or_default()
}

fn fields_equal(old: &PropertyValue, new: &PropertyValue, order_insensitive: bool) -> bool {
    if order_insensitive {
        canonical_form(old, true) == canonical_form(new, true)
    } else {
        old == new
    }
}

/// Compare a full snapshot against the previous state.
///
/// Cold start: an empty `previous` classifies every current entity as new.
pub fn diff(
    previous: &FxHashMap<String, EntityRecord>,
    current: &[EntityRecord],
    options: &DiffOptions,
) -> DiffResult {
    let mut result = DiffResult::default();

    // Last record wins when a snapshot carries duplicate object ids
    // (collection paging can overlap at page boundaries).
    let mut current_by_id: FxHashMap<&str, &EntityRecord> = FxHashMap::default();
    for record in current {
        if record.object_id.is_empty() {
            warn!(entity_type = %record.entity_type, "dropping record with empty objectId");
            result.skipped += 1;
            continue;
        }
        if current_by_id.insert(record.object_id.as_str(), record).is_some() {
            result.duplicates += 1;
        }
    }

    for (object_id, record) in &current_by_id {
        match previous.get(*object_id) {
            None => result.new.push((*record).clone()),
            Some(prior) => {
                let mut deltas: IndexMap<String, FieldDelta> = IndexMap::new();
                for field in &options.compare_fields {
                    let order_insensitive = options.array_fields.contains(field);
                    let old = prior.fields.get(field);
                    let new = record.fields.get(field);
                    let changed = match (old, new) {
                        (None, None) => false,
                        (Some(o), Some(n)) => !fields_equal(o, n, order_insensitive),
                        _ => true,
                    };
                    if changed {
                        deltas.insert(
                            field.clone(),
                            FieldDelta {
                                old: old.cloned(),
                                new: new.cloned(),
                            },
                        );
                    }
                }
                if deltas.is_empty() {
                    result.unchanged.push((*record).clone());
                } else {
                    result.modified.push(ModifiedEntity {
                        record: (*record).clone(),
                        deltas,
                    });
                }
            }
        }
    }

    for (object_id, prior) in previous {
        if !current_by_id.contains_key(object_id.as_str()) {
            result.deleted.push(prior.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap()
    }

    fn record(id: &str, name: &str) -> EntityRecord {
        let mut rec = EntityRecord::new(id, "user", ts());
        rec.set_field("displayName", name);
        rec
    }

    fn as_map(records: &[EntityRecord]) -> FxHashMap<String, EntityRecord> {
        records
            .iter()
            .map(|r| (r.object_id.clone(), r.clone()))
            .collect()
    }

    fn options() -> DiffOptions {
        DiffOptions::new(vec!["displayName".to_string(), "memberIds".to_string()])
            .with_array_fields(["memberIds".to_string()])
    }

    #[test]
    fn test_cold_start_all_new() {
        let previous = FxHashMap::default();
        let current = vec![record("a", "A"), record("b", "B")];
        let result = diff(&previous, &current, &options());
        assert_eq!(result.new.len(), 2);
        assert!(result.modified.is_empty());
        assert!(result.deleted.is_empty());
        assert!(result.unchanged.is_empty());
    }

    #[test]
    fn test_deletion_by_absence() {
        let previous = as_map(&[record("a", "A"), record("b", "B")]);
        let current = vec![record("a", "A")];
        let result = diff(&previous, &current, &options());
        assert_eq!(result.deleted.len(), 1);
        assert_eq!(result.deleted[0].object_id, "b");
        assert_eq!(result.unchanged.len(), 1);
    }

    #[test]
    fn test_modified_carries_field_deltas() {
        let previous = as_map(&[record("a", "Old Name")]);
        let current = vec![record("a", "New Name")];
        let result = diff(&previous, &current, &options());
        assert_eq!(result.modified.len(), 1);

        let deltas = &result.modified[0].deltas;
        assert_eq!(deltas.len(), 1);
        let delta = deltas.get("displayName").unwrap();
        assert_eq!(delta.old, Some("Old Name".into()));
        assert_eq!(delta.new, Some("New Name".into()));
    }

    #[test]
    fn test_field_added_and_removed_are_modifications() {
        let mut prior = record("a", "A");
        prior.set_field("city", "Oslo");
        let previous = as_map(&[prior]);

        let mut current_rec = record("a", "A");
        current_rec.set_field("department", "IT");
        let opts = DiffOptions::new(vec![
            "displayName".to_string(),
            "city".to_string(),
            "department".to_string(),
        ]);
        let result = diff(&previous, &[current_rec], &opts);
        assert_eq!(result.modified.len(), 1);
        let deltas = &result.modified[0].deltas;
        assert_eq!(deltas.get("city").unwrap().new, None);
        assert_eq!(deltas.get("department").unwrap().old, None);
    }

    #[test]
    fn test_array_reorder_is_unchanged() {
        let mut prior = record("g", "Group");
        prior.set_field(
            "memberIds",
            PropertyValue::Array(vec!["u1".into(), "u2".into(), "u3".into()]),
        );
        let previous = as_map(&[prior]);

        let mut current_rec = record("g", "Group");
        current_rec.set_field(
            "memberIds",
            PropertyValue::Array(vec!["u3".into(), "u1".into(), "u2".into()]),
        );
        let result = diff(&previous, &[current_rec], &options());
        assert_eq!(result.unchanged.len(), 1);
        assert!(result.modified.is_empty());
    }

    #[test]
    fn test_array_membership_change_is_modified() {
        let mut prior = record("g", "Group");
        prior.set_field("memberIds", PropertyValue::Array(vec!["u1".into(), "u2".into()]));
        let previous = as_map(&[prior]);

        let mut current_rec = record("g", "Group");
        current_rec.set_field("memberIds", PropertyValue::Array(vec!["u1".into(), "u9".into()]));
        let result = diff(&previous, &[current_rec], &options());
        assert_eq!(result.modified.len(), 1);
        assert!(result.modified[0].deltas.contains_key("memberIds"));
    }

    #[test]
    fn test_non_compare_field_change_ignored() {
        let mut prior = record("a", "A");
        prior.set_field("lastSeen", "yesterday");
        let previous = as_map(&[prior]);

        let mut current_rec = record("a", "A");
        current_rec.set_field("lastSeen", "today");
        let result = diff(&previous, &[current_rec], &options());
        assert_eq!(result.unchanged.len(), 1);
    }

    #[test]
    fn test_totality() {
        // Every id in previous ∪ current appears in exactly one partition.
        let previous = as_map(&[record("a", "A"), record("b", "B"), record("c", "C")]);
        let current = vec![record("b", "B"), record("c", "C2"), record("d", "D")];
        let result = diff(&previous, &current, &options());

        let mut seen: Vec<String> = result
            .new
            .iter()
            .chain(result.unchanged.iter())
            .chain(result.deleted.iter())
            .map(|r| r.object_id.clone())
            .chain(result.modified.iter().map(|m| m.record.object_id.clone()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
        assert_eq!(result.total(), 4);
    }

    #[test]
    fn test_determinism() {
        let previous = as_map(&[record("a", "A"), record("b", "B")]);
        let current = vec![record("b", "B2"), record("c", "C")];
        let r1 = diff(&previous, &current, &options());
        let r2 = diff(&previous, &current, &options());

        let ids = |v: &[EntityRecord]| {
            let mut ids: Vec<String> = v.iter().map(|r| r.object_id.clone()).collect();
            ids.sort();
            ids
        };
        assert_eq!(ids(&r1.new), ids(&r2.new));
        assert_eq!(ids(&r1.deleted), ids(&r2.deleted));
        assert_eq!(r1.modified.len(), r2.modified.len());
        assert_eq!(r1.modified[0].deltas, r2.modified[0].deltas);
    }

    #[test]
    fn test_missing_object_id_skipped() {
        let previous = FxHashMap::default();
        let mut bad = record("", "Nameless");
        bad.object_id = String::new();
        let current = vec![bad, record("a", "A")];
        let result = diff(&previous, &current, &options());
        assert_eq!(result.skipped, 1);
        assert_eq!(result.new.len(), 1);
    }

    #[test]
    fn test_duplicate_object_id_last_wins() {
        let previous = FxHashMap::default();
        let current = vec![record("a", "First"), record("a", "Second")];
        let result = diff(&previous, &current, &options());
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.new.len(), 1);
        assert_eq!(result.new[0].field_str("displayName"), Some("Second"));
    }
}
