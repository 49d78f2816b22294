//! Change event emitter
//!
//! Converts a differ result into the ordered change log consumed by the
//! graph projector and other change feeds. Unchanged entities emit nothing,
//! which keeps the change log from growing without bound.
//!
//! Deletions produce an explicit tombstone event (`deleted = true`) so a
//! soft-delete-capable sink can still answer "when did this disappear".

use super::differ::{DiffResult, FieldDelta};
use crate::model::{EntityRecord, PropertyMap};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// What the change applies to in the graph: a vertex or an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "targetKind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChangeTarget {
    Vertex {
        label: String,
        #[serde(default)]
        properties: PropertyMap,
    },
    Edge {
        source_id: String,
        target_id: String,
        edge_kind: String,
        #[serde(default)]
        properties: PropertyMap,
    },
}

/// One entry in the change log.
///
/// Events are totally ordered by (changeTimestamp, sequence); all events from
/// one emission share the emission timestamp and are sequenced within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub sequence: u64,
    pub change_type: ChangeKind,
    pub entity_id: String,
    pub entity_type: String,
    pub partition_key: String,
    pub change_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub target: ChangeTarget,
    /// Per-field before/after values, updates only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_deltas: Option<IndexMap<String, FieldDelta>>,
    /// Tombstone marker, set on delete events
    #[serde(default)]
    pub deleted: bool,
}

impl ChangeEvent {
    /// True if this event targets a vertex
    pub fn is_vertex(&self) -> bool {
        matches!(self.target, ChangeTarget::Vertex { .. })
    }
}

/// Whether an entity type projects to vertices or edges.
#[derive(Debug, Clone)]
pub enum EntityShape {
    /// Principals/resources become vertices with this label
    Vertex { label: String },
    /// Relationship records become edges; sourceId/targetId/edgeType are
    /// read from the record's fields
    Edge,
}

/// Per-run summary counts. Observability metadata only — nothing downstream
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub entity_type: String,
    pub timestamp: DateTime<Utc>,
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub total: usize,
}

/// Emitter output: the ordered events plus the run summary.
#[derive(Debug, Clone)]
pub struct EmitOutput {
    pub events: Vec<ChangeEvent>,
    pub snapshot: SnapshotDocument,
    /// Edge-shaped records dropped for missing endpoint fields
    pub skipped: u64,
}

fn target_for(record: &EntityRecord, shape: &EntityShape) -> Option<ChangeTarget> {
    match shape {
        EntityShape::Vertex { label } => Some(ChangeTarget::Vertex {
            label: label.clone(),
            properties: record.fields.clone(),
        }),
        EntityShape::Edge => {
            let source_id = record.field_str("sourceId")?;
            let target_id = record.field_str("targetId")?;
            let edge_kind = record
                .field_str("edgeType")
                .unwrap_or(record.entity_type.as_str());
            Some(ChangeTarget::Edge {
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
                edge_kind: edge_kind.to_string(),
                properties: record.fields.clone(),
            })
        }
    }
}

/// Convert a differ result into ordered change events plus a summary.
///
/// Event order is creates, then updates, then deletes, each carrying a
/// monotonic sequence starting at `start_sequence`.
pub fn emit(
    diff: &DiffResult,
    entity_type: &str,
    shape: &EntityShape,
    partition_key: &str,
    timestamp: DateTime<Utc>,
    start_sequence: u64,
) -> EmitOutput {
    let mut events = Vec::with_capacity(diff.new.len() + diff.modified.len() + diff.deleted.len());
    let mut sequence = start_sequence;
    let mut skipped = 0u64;

    let mut push = |record: &EntityRecord,
                    change_type: ChangeKind,
                    field_deltas: Option<IndexMap<String, FieldDelta>>,
                    events: &mut Vec<ChangeEvent>,
                    sequence: &mut u64,
                    skipped: &mut u64| {
        let Some(mut target) = target_for(record, shape) else {
            warn!(
                entity_type,
                object_id = %record.object_id,
                "dropping edge-shaped record missing sourceId/targetId"
            );
            *skipped += 1;
            return;
        };
        // Tombstones carry identity only.
        if change_type == ChangeKind::Delete {
            match &mut target {
                ChangeTarget::Vertex { properties, .. } => properties.clear(),
                ChangeTarget::Edge { properties, .. } => properties.clear(),
            }
        }
        events.push(ChangeEvent {
            sequence: *sequence,
            change_type,
            entity_id: record.object_id.clone(),
            entity_type: entity_type.to_string(),
            partition_key: partition_key.to_string(),
            change_timestamp: timestamp,
            target,
            field_deltas,
            deleted: change_type == ChangeKind::Delete,
        });
        *sequence += 1;
    };

    for record in &diff.new {
        push(record, ChangeKind::Create, None, &mut events, &mut sequence, &mut skipped);
    }
    for modified in &diff.modified {
        push(
            &modified.record,
            ChangeKind::Update,
            Some(modified.deltas.clone()),
            &mut events,
            &mut sequence,
            &mut skipped,
        );
    }
    for record in &diff.deleted {
        push(record, ChangeKind::Delete, None, &mut events, &mut sequence, &mut skipped);
    }

    let snapshot = SnapshotDocument {
        entity_type: entity_type.to_string(),
        timestamp,
        new: diff.new.len(),
        modified: diff.modified.len(),
        deleted: diff.deleted.len(),
        unchanged: diff.unchanged.len(),
        total: diff.total(),
    };

    EmitOutput {
        events,
        snapshot,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::differ::{diff, DiffOptions};
    use chrono::TimeZone;
    use rustc_hash::FxHashMap;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 11, 0, 0).unwrap()
    }

    fn record(id: &str, name: &str) -> EntityRecord {
        let mut rec = EntityRecord::new(id, "user", ts());
        rec.set_field("displayName", name);
        rec
    }

    fn vertex_shape() -> EntityShape {
        EntityShape::Vertex {
            label: "User".to_string(),
        }
    }

    #[test]
    fn test_unchanged_entities_emit_nothing() {
        let previous: FxHashMap<String, EntityRecord> =
            [("a".to_string(), record("a", "A"))].into_iter().collect();
        let current = vec![record("a", "A"), record("b", "B")];
        let opts = DiffOptions::new(vec!["displayName".to_string()]);
        let result = diff(&previous, &current, &opts);

        let out = emit(&result, "user", &vertex_shape(), "tenant-1", ts(), 0);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].change_type, ChangeKind::Create);
        assert_eq!(out.snapshot.unchanged, 1);
        assert_eq!(out.snapshot.total, 2);
    }

    #[test]
    fn test_event_ordering_and_sequence() {
        let previous: FxHashMap<String, EntityRecord> = [
            ("mod".to_string(), record("mod", "Before")),
            ("del".to_string(), record("del", "Gone")),
        ]
        .into_iter()
        .collect();
        let current = vec![record("mod", "After"), record("new", "Fresh")];
        let opts = DiffOptions::new(vec!["displayName".to_string()]);
        let result = diff(&previous, &current, &opts);

        let out = emit(&result, "user", &vertex_shape(), "tenant-1", ts(), 10);
        let kinds: Vec<ChangeKind> = out.events.iter().map(|e| e.change_type).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete]
        );
        let seqs: Vec<u64> = out.events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    #[test]
    fn test_delete_event_is_identity_only_tombstone() {
        let previous: FxHashMap<String, EntityRecord> =
            [("a".to_string(), record("a", "A"))].into_iter().collect();
        let opts = DiffOptions::new(vec!["displayName".to_string()]);
        let result = diff(&previous, &[], &opts);

        let out = emit(&result, "user", &vertex_shape(), "tenant-1", ts(), 0);
        assert_eq!(out.events.len(), 1);
        let event = &out.events[0];
        assert!(event.deleted);
        assert_eq!(event.entity_id, "a");
        match &event.target {
            ChangeTarget::Vertex { properties, .. } => assert!(properties.is_empty()),
            _ => panic!("expected vertex target"),
        }
    }

    #[test]
    fn test_update_carries_field_deltas() {
        let previous: FxHashMap<String, EntityRecord> =
            [("a".to_string(), record("a", "Old"))].into_iter().collect();
        let current = vec![record("a", "New")];
        let opts = DiffOptions::new(vec!["displayName".to_string()]);
        let result = diff(&previous, &current, &opts);

        let out = emit(&result, "user", &vertex_shape(), "tenant-1", ts(), 0);
        let deltas = out.events[0].field_deltas.as_ref().unwrap();
        assert_eq!(deltas.get("displayName").unwrap().old, Some("Old".into()));
    }

    #[test]
    fn test_edge_shape_reads_endpoints() {
        let mut rec = EntityRecord::new("e-1", "memberOf", ts());
        rec.set_field("sourceId", "u1");
        rec.set_field("targetId", "g1");
        rec.set_field("edgeType", "memberOf");
        let result = diff(
            &FxHashMap::default(),
            &[rec],
            &DiffOptions::new(vec![]),
        );

        let out = emit(&result, "memberOf", &EntityShape::Edge, "tenant-1", ts(), 0);
        assert_eq!(out.events.len(), 1);
        match &out.events[0].target {
            ChangeTarget::Edge {
                source_id,
                target_id,
                edge_kind,
                ..
            } => {
                assert_eq!(source_id, "u1");
                assert_eq!(target_id, "g1");
                assert_eq!(edge_kind, "memberOf");
            }
            _ => panic!("expected edge target"),
        }
    }

    #[test]
    fn test_edge_shape_missing_endpoints_skipped() {
        let rec = EntityRecord::new("e-1", "memberOf", ts());
        let result = diff(&FxHashMap::default(), &[rec], &DiffOptions::new(vec![]));
        let out = emit(&result, "memberOf", &EntityShape::Edge, "tenant-1", ts(), 0);
        assert!(out.events.is_empty());
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_event_wire_shape() {
        let current = vec![record("a", "A")];
        let result = diff(
            &FxHashMap::default(),
            &current,
            &DiffOptions::new(vec!["displayName".to_string()]),
        );
        let out = emit(&result, "user", &vertex_shape(), "tenant-1", ts(), 0);

        let json = serde_json::to_value(&out.events[0]).unwrap();
        assert_eq!(json["changeType"], "create");
        assert_eq!(json["entityId"], "a");
        assert_eq!(json["partitionKey"], "tenant-1");
        assert_eq!(json["targetKind"], "vertex");
        assert_eq!(json["label"], "User");

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, out.events[0]);
    }
}
