//! Object-graph codec.
//!
//! Objects live in an [`ObjectGraph`] arena and point at each other through
//! [`ObjectId`]s, so shared and cyclic references need no ownership tricks.
//! Each object's layout comes from a [`TypeDescriptor`] registered in a
//! [`TypeRegistry`]; [`GraphFormatter`] walks the arena and writes every
//! object as a sequential container of field slots.
//!
//! # Field slot encoding
//!
//! ```text
//! [0]                          null (also: empty array)
//! [1][scalar bytes]            primitive or text
//! [1][array pairs]             non-empty array
//! [1][object fields]           object, declared type
//! [1][i32 n][type name][fields] object in a dynamic slot
//! [2][i32 index]               back-reference to the index-th visited object
//! ```
//!
//! Array pairs are a sequential container of `(marker, payload)` blobs, one
//! pair per element, using the same markers.

pub mod compact;
pub mod formatter;
pub mod reflect;
pub mod schema;

use thiserror::Error;

use crate::container::ContainerError;
use crate::primitive::{Primitive, PrimitiveError, Scalar};

pub use formatter::{FormatterOptions, GraphFormatter};
pub use reflect::{expect_type, load, store_field, LoadContext, Reflect};
pub use schema::{FieldDescriptor, FieldKind, TypeDescriptor, TypeRegistry};

pub const MARKER_NULL:  u8 = 0;
pub const MARKER_VALUE: u8 = 1;
pub const MARKER_REF:   u8 = 2;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Container error: {0}")]
    Container(#[source] ContainerError),
    /// Malformed or incompatible encoded graph.
    #[error("Format error: {0}")]
    Format(String),
    #[error("Can't resolve type '{0}'")]
    TypeResolution(String),
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("Primitive error: {0}")]
    Primitive(#[from] PrimitiveError),
}

impl From<ContainerError> for GraphError {
    fn from(e: ContainerError) -> Self {
        match e {
            ContainerError::Format(msg)  => GraphError::Format(msg),
            ContainerError::Primitive(p) => GraphError::Primitive(p),
            other                        => GraphError::Container(other),
        }
    }
}

// ── Values ───────────────────────────────────────────────────────────────────

/// Index of an object in its [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize { self.0 as usize }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Scalar(Scalar),
    Array(Vec<Value>),
    Object(ObjectId),
}

impl Value {
    pub fn scalar(v: impl Into<Scalar>) -> Self {
        Value::Scalar(v.into())
    }

    /// Array of primitives.
    pub fn array_of<T: Primitive + Clone>(items: &[T]) -> Self {
        Value::Array(items.iter().cloned().map(|v| Value::Scalar(v.into_scalar())).collect())
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Typed view of a scalar.  `Ok(None)` for null.
    pub fn to_primitive<T: Primitive>(&self) -> Result<Option<T>, GraphError> {
        match self {
            Value::Null => Ok(None),
            Value::Scalar(s) => T::from_scalar(s.clone()).map(Some).ok_or_else(|| {
                GraphError::Format(format!("expected {}, found {}", T::KIND.name(), s.kind().name()))
            }),
            other => Err(GraphError::Format(format!(
                "expected {}, found {}",
                T::KIND.name(),
                other.describe()
            ))),
        }
    }

    /// Typed view of a primitive array.  `Ok(None)` for null.
    pub fn to_vec<T: Primitive + Default>(&self) -> Result<Option<Vec<T>>, GraphError> {
        match self {
            Value::Null => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(|v| v.to_primitive::<T>().map(Option::unwrap_or_default))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(GraphError::Format(format!("expected array, found {}", other.describe()))),
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Value::Null      => "null",
            Value::Scalar(s) => s.kind().name(),
            Value::Array(_)  => "array",
            Value::Object(_) => "object",
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self { Value::Scalar(s) }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self { Value::Object(id) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Objects ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: String,
    fields:    Vec<Value>,
}

impl Object {
    pub fn type_name(&self) -> &str { &self.type_name }
    pub fn fields(&self) -> &[Value] { &self.fields }

    pub fn field(&self, index: usize) -> Result<&Value, GraphError> {
        self.fields.get(index).ok_or_else(|| {
            GraphError::Usage(format!("{} has no field {index}", self.type_name))
        })
    }

    pub fn primitive<T: Primitive>(&self, index: usize) -> Result<Option<T>, GraphError> {
        self.field(index)?.to_primitive()
    }

    /// Primitive field, with null read as the type's default.
    pub fn primitive_or_default<T: Primitive + Default>(&self, index: usize) -> Result<T, GraphError> {
        Ok(self.primitive(index)?.unwrap_or_default())
    }

    pub fn object_ref(&self, index: usize) -> Result<Option<ObjectId>, GraphError> {
        match self.field(index)? {
            Value::Null => Ok(None),
            Value::Object(id) => Ok(Some(*id)),
            other => Err(GraphError::Format(format!("expected object, found {}", other.describe()))),
        }
    }
}

/// Arena of objects addressed by [`ObjectId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.objects.len() }
    pub fn is_empty(&self) -> bool { self.objects.is_empty() }

    /// Add an object with every field null.
    pub fn allocate(&mut self, type_name: impl Into<String>, field_count: usize) -> ObjectId {
        self.insert(type_name, vec![Value::Null; field_count])
    }

    pub fn insert(&mut self, type_name: impl Into<String>, fields: Vec<Value>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object { type_name: type_name.into(), fields });
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.index())
    }

    pub fn object(&self, id: ObjectId) -> Result<&Object, GraphError> {
        self.get(id).ok_or_else(|| GraphError::Usage(format!("object {} is not in the graph", id.0)))
    }

    pub fn set_field(&mut self, id: ObjectId, index: usize, value: impl Into<Value>) -> Result<(), GraphError> {
        let object = self
            .objects
            .get_mut(id.index())
            .ok_or_else(|| GraphError::Usage(format!("object {} is not in the graph", id.0)))?;
        let slot = object.fields.get_mut(index).ok_or_else(|| {
            GraphError::Usage(format!("{} has no field {index}", object.type_name))
        })?;
        *slot = value.into();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i as u32), o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_patch_fields() {
        let mut graph = ObjectGraph::new();
        let id = graph.allocate("Node", 2);
        graph.set_field(id, 0, Value::scalar(5i32)).unwrap();
        graph.set_field(id, 1, id).unwrap();

        let node = graph.object(id).unwrap();
        assert_eq!(node.primitive::<i32>(0).unwrap(), Some(5));
        assert_eq!(node.object_ref(1).unwrap(), Some(id));
        assert!(graph.set_field(id, 2, Value::Null).is_err());
    }

    #[test]
    fn typed_views_reject_mismatches() {
        assert_eq!(Value::Null.to_primitive::<i32>().unwrap(), None);
        assert!(Value::scalar("x").to_primitive::<i32>().is_err());
        assert_eq!(
            Value::array_of(&[1u16, 2]).to_vec::<u16>().unwrap(),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn container_format_errors_surface_as_format() {
        let e: GraphError = ContainerError::Format("bad".into()).into();
        assert!(matches!(e, GraphError::Format(_)));
        let e: GraphError = ContainerError::Closed.into();
        assert!(matches!(e, GraphError::Container(ContainerError::Closed)));
    }
}
