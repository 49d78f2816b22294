//! Core type definitions for the graph sink

use crate::model::PropertyMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vertex label (e.g. "User", "ServicePrincipal")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Label(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(s)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(s.to_string())
    }
}

/// Edge kind (relationship or capability type, e.g. "memberOf",
/// "canAddSecretToAnyApp")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeKind(String);

impl EdgeKind {
    pub fn new(kind: impl Into<String>) -> Self {
        EdgeKind(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EdgeKind {
    fn from(s: String) -> Self {
        EdgeKind(s)
    }
}

impl From<&str> for EdgeKind {
    fn from(s: &str) -> Self {
        EdgeKind(s.to_string())
    }
}

/// A vertex in the sink graph, keyed by its stable object id and partitioned
/// by tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub id: String,
    pub label: Label,
    pub partition_key: String,
    pub properties: PropertyMap,
}

impl Vertex {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<Label>,
        partition_key: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        Vertex {
            id: id.into(),
            label: label.into(),
            partition_key: partition_key.into(),
            properties,
        }
    }
}

/// An edge in the sink graph, keyed by (source, target, kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    pub properties: PropertyMap,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: impl Into<EdgeKind>,
        properties: PropertyMap,
    ) -> Self {
        GraphEdge {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind: kind.into(),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        let label = Label::new("User");
        assert_eq!(label.as_str(), "User");
        assert_eq!(format!("{}", label), "User");

        let label2: Label = "Group".into();
        assert_eq!(label2.as_str(), "Group");
    }

    #[test]
    fn test_edge_kind() {
        let kind = EdgeKind::new("memberOf");
        assert_eq!(kind.as_str(), "memberOf");
        assert_eq!(format!("{}", kind), "memberOf");
    }

    #[test]
    fn test_vertex() {
        let vertex = Vertex::new("u-1", "User", "tenant-1", PropertyMap::new());
        assert_eq!(vertex.id, "u-1");
        assert_eq!(vertex.label.as_str(), "User");
        assert_eq!(vertex.partition_key, "tenant-1");
    }
}
