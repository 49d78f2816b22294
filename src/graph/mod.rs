//! Graph sink: property graph types, the sink trait, and the in-memory store

pub mod sink;
pub mod store;
pub mod types;

pub use sink::{GraphSink, SinkError, SinkResult};
pub use store::GraphStore;
pub use types::{EdgeKind, GraphEdge, Label, Vertex};
