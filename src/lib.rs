//! Escalade — tenant security graph indexer
//!
//! Pulls full JSON-Lines snapshots of directory, identity, and cloud-resource
//! metadata, computes deltas against the previous snapshot, projects the
//! deltas into a property graph store, and expands raw relationship edges
//! into derived privilege-escalation ("abuse") capability edges.
//!
//! # Architecture
//!
//! Data flows through four components:
//!
//! - **Snapshot differ** ([`diff::differ`]): partitions each full snapshot
//!   against the previous state into {new, modified, deleted, unchanged}
//!   with field-level change tracking.
//! - **Change event emitter** ([`diff::emitter`]): converts differ output
//!   into an ordered change log plus a per-run summary document.
//! - **Abuse rule engine** ([`rules`]): evaluates raw edges against static
//!   rule tables and emits derived capability edges with deterministic,
//!   idempotent identifiers.
//! - **Graph projector** ([`projector`]): applies the change log to a graph
//!   sink, vertices before edges, resumable via a conditionally-written
//!   watermark.
//!
//! Collection itself (REST paging, token acquisition, retries against cloud
//! storage) is out of scope; the pipeline consumes adapters — a snapshot
//! reader, a change-log reader, a graph sink, and a watermark store.
//!
//! ## Example Usage
//!
//! ```rust
//! use escalade::diff::{diff, emit, DiffOptions, EntityShape};
//! use escalade::model::EntityRecord;
//! use escalade::rules::{derive_abuse_edges, RuleTables};
//! use chrono::Utc;
//! use rustc_hash::FxHashMap;
//!
//! let previous: FxHashMap<String, EntityRecord> = FxHashMap::default();
//! let mut user = EntityRecord::new("u-1", "user", Utc::now());
//! user.set_field("displayName", "Alice");
//!
//! let options = DiffOptions::new(vec!["displayName".to_string()]);
//! let result = diff(&previous, &[user], &options);
//! assert_eq!(result.new.len(), 1);
//!
//! let shape = EntityShape::Vertex { label: "User".to_string() };
//! let out = emit(&result, "user", &shape, "tenant-1", Utc::now(), 0);
//! assert_eq!(out.events.len(), 1);
//!
//! // The rule tables ship with built-in reference data.
//! let derivation = derive_abuse_edges(&[], &RuleTables::builtin());
//! assert!(derivation.edges.is_empty());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod changelog;
pub mod diff;
pub mod graph;
pub mod model;
pub mod projector;
pub mod rules;

// Re-export main types for convenience
pub use model::{
    edge_object_id, DerivedEdge, EntityRecord, PropertyMap, PropertyValue, RawEdge, Severity,
};

pub use diff::{
    diff, emit, ChangeEvent, ChangeKind, ChangeTarget, DiffOptions, DiffResult, EmitOutput,
    EntityShape, FieldDelta, ModifiedEntity, SnapshotDocument,
};

pub use rules::{derive_abuse_edges, Derivation, DerivationCounts, RuleError, RuleTables};

pub use graph::{EdgeKind, GraphEdge, GraphSink, GraphStore, Label, SinkError, SinkResult, Vertex};

pub use changelog::{
    ChangeLogError, ChangeLogReader, ChangeLogResult, JsonlChangeLog, JsonlSnapshotStore,
    SnapshotReader,
};

pub use projector::{
    FileWatermarkStore, Projector, ProjectorConfig, ProjectorError, RunReport, WatermarkError,
    WatermarkState, WatermarkStore,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
