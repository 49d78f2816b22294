//! In-memory graph store
//!
//! Reference [`GraphSink`] implementation used by tests and the CLI. Hash
//! maps with label/kind indices; all operations are idempotent upserts or
//! no-op-tolerant deletes, matching the sink contract.
//!
//! Edges are validated against their endpoints: upserting an edge whose
//! source or target vertex is absent is rejected. Virtual scope targets
//! ("allApps", "tenant", Azure scopes) are ordinary vertices created by the
//! caller before capability edges point at them.

use super::sink::{GraphSink, SinkError, SinkResult};
use super::types::{EdgeKind, GraphEdge, Label, Vertex};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// (source, target, kind) — the stable edge key
type EdgeKey = (String, String, EdgeKind);

#[derive(Debug, Default)]
struct Inner {
    vertices: HashMap<String, Vertex>,
    edges: HashMap<EdgeKey, GraphEdge>,
    label_index: HashMap<Label, HashSet<String>>,
    kind_index: HashMap<EdgeKind, HashSet<EdgeKey>>,
}

/// In-memory property graph keyed by stable object identifiers.
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<Inner>,
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.read().unwrap().vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().unwrap().edges.len()
    }

    pub fn get_vertex(&self, id: &str) -> Option<Vertex> {
        self.inner.read().unwrap().vertices.get(id).cloned()
    }

    pub fn contains_vertex(&self, id: &str) -> bool {
        self.inner.read().unwrap().vertices.contains_key(id)
    }

    pub fn get_edge(&self, source_id: &str, target_id: &str, kind: &EdgeKind) -> Option<GraphEdge> {
        let key = (source_id.to_string(), target_id.to_string(), kind.clone());
        self.inner.read().unwrap().edges.get(&key).cloned()
    }

    /// All vertices carrying a label
    pub fn vertices_by_label(&self, label: &Label) -> Vec<Vertex> {
        let inner = self.inner.read().unwrap();
        inner
            .label_index
            .get(label)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.vertices.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges of a kind (raw relationship or derived capability)
    pub fn edges_by_kind(&self, kind: &EdgeKind) -> Vec<GraphEdge> {
        let inner = self.inner.read().unwrap();
        inner
            .kind_index
            .get(kind)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| inner.edges.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges leaving a vertex
    pub fn outgoing_edges(&self, source_id: &str) -> Vec<GraphEdge> {
        let inner = self.inner.read().unwrap();
        inner
            .edges
            .values()
            .filter(|edge| edge.source_id == source_id)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn upsert_vertex(&mut self, vertex: Vertex) {
        if let Some(prior) = self.vertices.get(&vertex.id) {
            if prior.label != vertex.label {
                if let Some(ids) = self.label_index.get_mut(&prior.label) {
                    ids.remove(&vertex.id);
                }
            }
        }
        self.label_index
            .entry(vertex.label.clone())
            .or_default()
            .insert(vertex.id.clone());
        self.vertices.insert(vertex.id.clone(), vertex);
    }

    fn remove_vertex(&mut self, id: &str) {
        let Some(vertex) = self.vertices.remove(id) else {
            return;
        };
        if let Some(ids) = self.label_index.get_mut(&vertex.label) {
            ids.remove(id);
        }
        // Incident edges go with the vertex.
        let incident: Vec<EdgeKey> = self
            .edges
            .keys()
            .filter(|(source, target, _)| source == id || target == id)
            .cloned()
            .collect();
        for key in incident {
            if let Some(keys) = self.kind_index.get_mut(&key.2) {
                keys.remove(&key);
            }
            self.edges.remove(&key);
        }
    }

    fn upsert_edge(&mut self, edge: GraphEdge) -> SinkResult<()> {
        if !self.vertices.contains_key(&edge.source_id) {
            return Err(SinkError::Rejected(format!(
                "edge source vertex {} does not exist",
                edge.source_id
            )));
        }
        if !self.vertices.contains_key(&edge.target_id) {
            return Err(SinkError::Rejected(format!(
                "edge target vertex {} does not exist",
                edge.target_id
            )));
        }
        let key = (
            edge.source_id.clone(),
            edge.target_id.clone(),
            edge.kind.clone(),
        );
        self.kind_index
            .entry(edge.kind.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, edge);
        Ok(())
    }

    fn remove_edge(&mut self, source_id: &str, target_id: &str, kind: &EdgeKind) {
        let key = (source_id.to_string(), target_id.to_string(), kind.clone());
        if self.edges.remove(&key).is_some() {
            if let Some(keys) = self.kind_index.get_mut(kind) {
                keys.remove(&key);
            }
        }
    }
}

#[async_trait]
impl GraphSink for GraphStore {
    async fn upsert_vertex(&self, vertex: Vertex) -> SinkResult<()> {
        self.inner.write().unwrap().upsert_vertex(vertex);
        Ok(())
    }

    async fn remove_vertex(&self, id: &str) -> SinkResult<()> {
        self.inner.write().unwrap().remove_vertex(id);
        Ok(())
    }

    async fn upsert_edge(&self, edge: GraphEdge) -> SinkResult<()> {
        self.inner.write().unwrap().upsert_edge(edge)
    }

    async fn remove_edge(
        &self,
        source_id: &str,
        target_id: &str,
        kind: &EdgeKind,
    ) -> SinkResult<()> {
        self.inner
            .write()
            .unwrap()
            .remove_edge(source_id, target_id, kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyMap;

    fn vertex(id: &str, label: &str) -> Vertex {
        Vertex::new(id, label, "tenant-1", PropertyMap::new())
    }

    #[tokio::test]
    async fn test_upsert_vertex_idempotent() {
        let store = GraphStore::new();
        store.upsert_vertex(vertex("u1", "User")).await.unwrap();
        store.upsert_vertex(vertex("u1", "User")).await.unwrap();
        assert_eq!(store.vertex_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_vertex_replaces_properties() {
        let store = GraphStore::new();
        store.upsert_vertex(vertex("u1", "User")).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("displayName".to_string(), "Alice".into());
        store
            .upsert_vertex(Vertex::new("u1", "User", "tenant-1", props))
            .await
            .unwrap();

        let got = store.get_vertex("u1").unwrap();
        assert_eq!(
            got.properties.get("displayName").and_then(|v| v.as_str()),
            Some("Alice")
        );
    }

    #[tokio::test]
    async fn test_label_index_follows_relabel() {
        let store = GraphStore::new();
        store.upsert_vertex(vertex("x", "User")).await.unwrap();
        store.upsert_vertex(vertex("x", "Device")).await.unwrap();

        assert!(store.vertices_by_label(&Label::new("User")).is_empty());
        assert_eq!(store.vertices_by_label(&Label::new("Device")).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_vertex_is_noop() {
        let store = GraphStore::new();
        store.remove_vertex("ghost").await.unwrap();
        assert_eq!(store.vertex_count(), 0);
    }

    #[tokio::test]
    async fn test_edge_requires_endpoints() {
        let store = GraphStore::new();
        let edge = GraphEdge::new("u1", "g1", "memberOf", PropertyMap::new());
        let result = store.upsert_edge(edge).await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_edge_upsert_and_remove() {
        let store = GraphStore::new();
        store.upsert_vertex(vertex("u1", "User")).await.unwrap();
        store.upsert_vertex(vertex("g1", "Group")).await.unwrap();

        let edge = GraphEdge::new("u1", "g1", "memberOf", PropertyMap::new());
        store.upsert_edge(edge.clone()).await.unwrap();
        store.upsert_edge(edge).await.unwrap();
        assert_eq!(store.edge_count(), 1);

        let kind = EdgeKind::new("memberOf");
        store.remove_edge("u1", "g1", &kind).await.unwrap();
        assert_eq!(store.edge_count(), 0);

        // Removing again is a no-op, not an error.
        store.remove_edge("u1", "g1", &kind).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_vertex_drops_incident_edges() {
        let store = GraphStore::new();
        store.upsert_vertex(vertex("u1", "User")).await.unwrap();
        store.upsert_vertex(vertex("g1", "Group")).await.unwrap();
        store
            .upsert_edge(GraphEdge::new("u1", "g1", "memberOf", PropertyMap::new()))
            .await
            .unwrap();

        store.remove_vertex("g1").await.unwrap();
        assert_eq!(store.edge_count(), 0);
        assert!(store.edges_by_kind(&EdgeKind::new("memberOf")).is_empty());
    }

    #[tokio::test]
    async fn test_edges_by_kind_and_outgoing() {
        let store = GraphStore::new();
        for id in ["u1", "g1", "g2"] {
            store.upsert_vertex(vertex(id, "Any")).await.unwrap();
        }
        store
            .upsert_edge(GraphEdge::new("u1", "g1", "memberOf", PropertyMap::new()))
            .await
            .unwrap();
        store
            .upsert_edge(GraphEdge::new("u1", "g2", "groupOwner", PropertyMap::new()))
            .await
            .unwrap();

        assert_eq!(store.edges_by_kind(&EdgeKind::new("memberOf")).len(), 1);
        assert_eq!(store.outgoing_edges("u1").len(), 2);
    }
}
