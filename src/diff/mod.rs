//! Snapshot delta pipeline: the differ and the change event emitter

pub mod differ;
pub mod emitter;

pub use differ::{diff, DiffOptions, DiffResult, FieldDelta, ModifiedEntity};
pub use emitter::{
    emit, ChangeEvent, ChangeKind, ChangeTarget, EmitOutput, EntityShape, SnapshotDocument,
};
