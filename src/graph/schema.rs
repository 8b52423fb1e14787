//! Type descriptors: the per-type field layout the codec walks.
//!
//! A descriptor lists a type's instance fields in a fixed order; writer and
//! reader both follow that order, so it must not change between the two.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::primitive::{Primitive, PrimitiveKind};

/// Classification of a field, computed once per declared field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Primitive or text.
    Scalar(PrimitiveKind),
    /// Array whose elements are of the inner kind.  Jagged and
    /// multi-dimensional data is an array of arrays.
    Array(Box<FieldKind>),
    /// Object of exactly the named type.
    Object(String),
    /// Object of any registered type; its type name travels with it.
    Dynamic,
}

impl FieldKind {
    pub fn of<T: Primitive>() -> Self {
        FieldKind::Scalar(T::KIND)
    }

    pub fn array(inner: FieldKind) -> Self {
        FieldKind::Array(Box::new(inner))
    }

    pub fn object(type_name: impl Into<String>) -> Self {
        FieldKind::Object(type_name.into())
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Object(_) | FieldKind::Dynamic)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(k)  => f.write_str(k.name()),
            FieldKind::Array(k)   => write!(f, "[{k}]"),
            FieldKind::Object(n)  => f.write_str(n),
            FieldKind::Dynamic    => f.write_str("dynamic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name:   String,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    /// Append a field.  Declaration order is wire order.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor { name: name.into(), kind });
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn fields(&self) -> &[FieldDescriptor] { &self.fields }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Last path segment (`a::b::C` and `a.b.C` both give `C`).
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

fn short_name(name: &str) -> &str {
    let tail = name.rsplit("::").next().unwrap_or(name);
    tail.rsplit('.').next().unwrap_or(tail)
}

/// Catalogue of every type the codec may encounter.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register (or replace) a descriptor under its full name.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize { self.types.len() }
    pub fn is_empty(&self) -> bool { self.types.is_empty() }

    /// Exact lookup first, then a search by unqualified name.  The fallback
    /// only succeeds when exactly one registered type has that short name.
    pub fn resolve(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        if let Some(d) = self.types.get(name) {
            return Some(Arc::clone(d));
        }
        let wanted = short_name(name);
        let mut matches = self.types.values().filter(|d| d.short_name() == wanted);
        match (matches.next(), matches.next()) {
            (Some(d), None) => Some(Arc::clone(d)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_unique_short_name() {
        let mut reg = TypeRegistry::new();
        reg.register(TypeDescriptor::new("game::net::RotationPacket"));
        reg.register(TypeDescriptor::new("game::Vector"));
        reg.register(TypeDescriptor::new("math::Vector"));

        assert_eq!(reg.resolve("game::net::RotationPacket").unwrap().name(), "game::net::RotationPacket");
        assert_eq!(reg.resolve("Tester.RotationPacket").unwrap().name(), "game::net::RotationPacket");
        assert!(reg.resolve("Vector").is_none());
        assert!(reg.resolve("Missing").is_none());
    }

    #[test]
    fn descriptor_keeps_declaration_order() {
        let d = TypeDescriptor::new("P")
            .field("id", FieldKind::of::<i32>())
            .field("tags", FieldKind::array(FieldKind::of::<String>()))
            .field("next", FieldKind::object("P"));
        let names: Vec<&str> = d.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "tags", "next"]);
        assert_eq!(d.field_index("next"), Some(2));
        assert_eq!(d.fields()[1].kind.to_string(), "[text]");
    }
}
