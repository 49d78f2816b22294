//! Graph sink trait — the seam between the projector and the graph store
//!
//! Every operation is idempotent from the caller's perspective: upserting an
//! existing vertex/edge replaces it, removing an absent one is a no-op. That
//! contract is what lets the projector re-deliver a batch safely after a
//! crash.

use super::types::{EdgeKind, GraphEdge, Vertex};
use async_trait::async_trait;
use thiserror::Error;

/// Errors a sink may surface when applying a change.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Network/store error worth retrying with backoff
    #[error("Transient sink failure: {0}")]
    Transient(String),

    /// The change itself is invalid (e.g. malformed edge reference); retrying
    /// the same change will not help
    #[error("Sink rejected change: {0}")]
    Rejected(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Property graph store accepting vertex/edge upserts and deletes keyed by
/// stable object identifiers.
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Insert or replace a vertex
    async fn upsert_vertex(&self, vertex: Vertex) -> SinkResult<()>;

    /// Remove a vertex and its incident edges; absent vertex is a no-op
    async fn remove_vertex(&self, id: &str) -> SinkResult<()>;

    /// Insert or replace an edge keyed by (source, target, kind)
    async fn upsert_edge(&self, edge: GraphEdge) -> SinkResult<()>;

    /// Remove an edge; absent edge is a no-op
    async fn remove_edge(&self, source_id: &str, target_id: &str, kind: &EdgeKind)
        -> SinkResult<()>;
}
