pub mod primitive;
pub mod entry;
pub mod directory;
pub mod container;
pub mod graph;

pub use primitive::{Primitive, PrimitiveError, PrimitiveKind, Scalar, TextEncoding};
pub use entry::BlobEntry;
pub use directory::{DirectoryEntry, IndexedDirectory};
pub use container::{ContainerError, ContainerOptions, Layout, SequenceReader, SequenceWriter};
pub use graph::{
    FieldKind, FormatterOptions, GraphError, GraphFormatter, ObjectGraph, ObjectId, Reflect,
    TypeDescriptor, TypeRegistry, Value,
};
