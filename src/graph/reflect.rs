//! Typed bridge between Rust structs and the object arena.
//!
//! A type implements [`Reflect`] by describing its fields once and by
//! copying itself into and out of an [`ObjectGraph`].  Owned Rust values
//! form trees, so anything stored this way is acyclic.  Shared or cyclic
//! structures are built on the arena directly; loading a cycle into owned
//! values fails with `UnsupportedValue` instead of recursing forever.

use std::collections::HashSet;

use super::formatter::DEFAULT_MAX_DEPTH;
use super::schema::{TypeDescriptor, TypeRegistry};
use super::{GraphError, Object, ObjectGraph, ObjectId, Value};

pub trait Reflect: Sized {
    /// Registered name; also what [`TypeDescriptor::name`] returns.
    const TYPE_NAME: &'static str;

    fn descriptor() -> TypeDescriptor;

    /// Register this type.  Types with object fields override this to
    /// register those types as well.
    fn register(registry: &mut TypeRegistry) {
        registry.register(Self::descriptor());
    }

    fn store(&self, graph: &mut ObjectGraph) -> Result<ObjectId, GraphError>;

    /// Build `Self` from object `id`.  Nested objects go through
    /// [`LoadContext::load`] or [`LoadContext::load_field`].
    fn load(cx: &mut LoadContext<'_>, id: ObjectId) -> Result<Self, GraphError>;
}

/// State for one typed load: the arena and the objects currently being
/// loaded, innermost last.
#[derive(Debug)]
pub struct LoadContext<'g> {
    graph:     &'g ObjectGraph,
    loading:   HashSet<ObjectId>,
    max_depth: usize,
}

impl<'g> LoadContext<'g> {
    pub fn new(graph: &'g ObjectGraph) -> Self {
        Self { graph, loading: HashSet::new(), max_depth: DEFAULT_MAX_DEPTH }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn graph(&self) -> &'g ObjectGraph { self.graph }

    /// Load `T` from `id`.  Reaching an object that is still being loaded
    /// means the graph has a cycle, which owned values cannot represent.
    pub fn load<T: Reflect>(&mut self, id: ObjectId) -> Result<T, GraphError> {
        if self.loading.contains(&id) {
            return Err(GraphError::UnsupportedValue(format!(
                "object {} refers back to itself; {} cannot hold a cycle",
                id.index(),
                T::TYPE_NAME
            )));
        }
        if self.loading.len() >= self.max_depth {
            return Err(GraphError::UnsupportedValue(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        self.loading.insert(id);
        let result = T::load(self, id);
        self.loading.remove(&id);
        result
    }

    /// Load the optional nested object in field `index` of `id`.
    pub fn load_field<T: Reflect>(&mut self, id: ObjectId, index: usize) -> Result<Option<T>, GraphError> {
        match self.graph.object(id)?.object_ref(index)? {
            Some(child) => self.load(child).map(Some),
            None => Ok(None),
        }
    }
}

/// Load `T` rooted at `id`.
pub fn load<T: Reflect>(graph: &ObjectGraph, id: ObjectId) -> Result<T, GraphError> {
    LoadContext::new(graph).load(id)
}

/// Store an optional nested object as a field value.
pub fn store_field<T: Reflect>(value: Option<&T>, graph: &mut ObjectGraph) -> Result<Value, GraphError> {
    match value {
        Some(v) => Ok(Value::Object(v.store(graph)?)),
        None => Ok(Value::Null),
    }
}

/// Check that `id` holds an object of type `T`.
pub fn expect_type<'g, T: Reflect>(cx: &LoadContext<'g>, id: ObjectId) -> Result<&'g Object, GraphError> {
    let object = cx.graph().object(id)?;
    if object.type_name() != T::TYPE_NAME {
        return Err(GraphError::Format(format!(
            "expected {}, found {}",
            T::TYPE_NAME,
            object.type_name()
        )));
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FieldKind, FormatterOptions, GraphFormatter};

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        label: String,
    }

    impl Reflect for Tag {
        const TYPE_NAME: &'static str = "reflect::Tag";

        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new(Self::TYPE_NAME).field("label", FieldKind::of::<String>())
        }

        fn store(&self, graph: &mut ObjectGraph) -> Result<ObjectId, GraphError> {
            Ok(graph.insert(Self::TYPE_NAME, vec![Value::scalar(self.label.as_str())]))
        }

        fn load(cx: &mut LoadContext<'_>, id: ObjectId) -> Result<Self, GraphError> {
            let o = expect_type::<Self>(cx, id)?;
            Ok(Self { label: o.primitive_or_default(0)? })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id:  u32,
        tag: Option<Tag>,
    }

    impl Reflect for Item {
        const TYPE_NAME: &'static str = "reflect::Item";

        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new(Self::TYPE_NAME)
                .field("id", FieldKind::of::<u32>())
                .field("tag", FieldKind::object(Tag::TYPE_NAME))
        }

        fn register(registry: &mut TypeRegistry) {
            registry.register(Self::descriptor());
            Tag::register(registry);
        }

        fn store(&self, graph: &mut ObjectGraph) -> Result<ObjectId, GraphError> {
            let tag = store_field(self.tag.as_ref(), graph)?;
            Ok(graph.insert(Self::TYPE_NAME, vec![Value::scalar(self.id), tag]))
        }

        fn load(cx: &mut LoadContext<'_>, id: ObjectId) -> Result<Self, GraphError> {
            let o = expect_type::<Self>(cx, id)?;
            Ok(Self {
                id:  o.primitive_or_default(0)?,
                tag: cx.load_field(id, 1)?,
            })
        }
    }

    #[test]
    fn nested_struct_round_trips() {
        let mut f = GraphFormatter::new(TypeRegistry::new(), FormatterOptions::default());
        let item = Item { id: 9, tag: Some(Tag { label: "ünï".into() }) };
        let bytes = f.serialize_value(&item).unwrap();
        assert_eq!(f.deserialize_value::<Item>(&bytes).unwrap(), item);

        let bare = Item { id: 1, tag: None };
        let bytes = f.serialize_value(&bare).unwrap();
        assert_eq!(f.deserialize_value::<Item>(&bytes).unwrap(), bare);
    }

    #[test]
    fn load_checks_type() {
        let mut g = ObjectGraph::new();
        let id = Tag { label: "x".into() }.store(&mut g).unwrap();
        assert!(matches!(load::<Item>(&g, id), Err(GraphError::Format(_))));
    }

    #[derive(Debug)]
    struct Link {
        next: Option<Box<Link>>,
    }

    impl Reflect for Link {
        const TYPE_NAME: &'static str = "reflect::Link";

        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new(Self::TYPE_NAME).field("next", FieldKind::object(Self::TYPE_NAME))
        }

        fn store(&self, graph: &mut ObjectGraph) -> Result<ObjectId, GraphError> {
            let next = store_field(self.next.as_deref(), graph)?;
            Ok(graph.insert(Self::TYPE_NAME, vec![next]))
        }

        fn load(cx: &mut LoadContext<'_>, id: ObjectId) -> Result<Self, GraphError> {
            expect_type::<Self>(cx, id)?;
            Ok(Self { next: cx.load_field(id, 0)?.map(Box::new) })
        }
    }

    #[test]
    fn cycle_is_rejected_not_followed() {
        let mut g = ObjectGraph::new();
        let a = g.allocate(Link::TYPE_NAME, 1);
        let b = g.insert(Link::TYPE_NAME, vec![Value::Object(a)]);
        g.set_field(a, 0, b).unwrap();
        assert!(matches!(load::<Link>(&g, a), Err(GraphError::UnsupportedValue(_))));
    }

    #[test]
    fn shared_acyclic_object_loads_twice() {
        let mut g = ObjectGraph::new();
        let tail = g.insert(Link::TYPE_NAME, vec![Value::Null]);
        let mid = g.insert(Link::TYPE_NAME, vec![Value::Object(tail)]);
        let loaded = load::<Link>(&g, mid).unwrap();
        assert!(loaded.next.unwrap().next.is_none());
        // `tail` is loaded and released, so loading it again is fine.
        assert!(load::<Link>(&g, tail).is_ok());
    }

    #[test]
    fn load_depth_is_bounded() {
        let mut g = ObjectGraph::new();
        let mut id = g.insert(Link::TYPE_NAME, vec![Value::Null]);
        for _ in 0..10 {
            id = g.insert(Link::TYPE_NAME, vec![Value::Object(id)]);
        }
        let res = LoadContext::new(&g).with_max_depth(5).load::<Link>(id);
        assert!(matches!(res, Err(GraphError::UnsupportedValue(_))));
        assert!(LoadContext::new(&g).with_max_depth(11).load::<Link>(id).is_ok());
    }
}
