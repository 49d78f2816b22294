//! Data model: loose property values, entity records, raw and derived edges

pub mod edge;
pub mod property;
pub mod record;

pub use edge::{edge_object_id, DerivedEdge, RawEdge, Severity, DISPLAY_FIELDS};
pub use property::{PropertyMap, PropertyValue};
pub use record::EntityRecord;
