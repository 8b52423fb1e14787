//! Reference-tracking graph serializer.
//!
//! Objects are numbered in the order they are first visited (a depth-first
//! pre-order walk over fields).  Serializing records `ObjectId → index`
//! before descending into an object's fields; deserializing allocates each
//! object and records `index → ObjectId` before decoding its fields.  Both
//! sides visit in the same order, so a back-reference written as `[2][index]`
//! resolves to the instance that was allocated at that index, including an
//! ancestor still being decoded.
//!
//! A formatter's reference tables are reset on every top-level call.  The
//! type cache lives until [`GraphFormatter::dispose`].  One formatter must
//! not serve interleaved calls.
//!
//! Nesting (objects inside objects, arrays inside arrays) is limited to
//! [`FormatterOptions::max_depth`] levels.  Deeper input fails with
//! `Format` when decoding and `UnsupportedValue` when encoding.
//!
//! Each nested object or array is encoded into its own buffer and then
//! copied into its parent's slot, and decoding copies each slot out of its
//! parent the same way.  A value at depth `d` is therefore copied `d` times,
//! so cost grows quadratically with nesting depth.  The depth limit bounds
//! this; wide, shallow graphs are unaffected.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::schema::{FieldKind, TypeDescriptor, TypeRegistry};
use super::reflect::LoadContext;
use super::{GraphError, ObjectGraph, ObjectId, Reflect, Value, MARKER_NULL, MARKER_REF, MARKER_VALUE};
use crate::container::{ContainerOptions, Layout, SequenceReader, SequenceWriter};
use crate::primitive::{Scalar, TextEncoding};

/// Default limit on object and array nesting.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Configuration for [`GraphFormatter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    /// Encoding for text values.  Type names are always UTF-8.
    pub encoding:  TextEncoding,
    /// Deepest nesting of objects and arrays accepted in either direction.
    pub max_depth: usize,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            encoding:  TextEncoding::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl FormatterOptions {
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug)]
pub struct GraphFormatter {
    registry:   TypeRegistry,
    encoding:   TextEncoding,
    max_depth:  usize,
    type_cache: HashMap<String, Arc<TypeDescriptor>>,
    /// Serialize side: object → visitation index.
    visited:    HashMap<ObjectId, i32>,
    /// Deserialize side: visitation index → allocated object.
    instances:  Vec<ObjectId>,
    /// Current object/array nesting.
    depth:      usize,
}

impl Default for GraphFormatter {
    fn default() -> Self {
        Self::new(TypeRegistry::new(), FormatterOptions::default())
    }
}

impl GraphFormatter {
    pub fn new(registry: TypeRegistry, options: FormatterOptions) -> Self {
        Self {
            registry,
            encoding:   options.encoding,
            max_depth:  options.max_depth,
            type_cache: HashMap::new(),
            visited:    HashMap::new(),
            instances:  Vec::new(),
            depth:      0,
        }
    }

    pub fn encoding(&self) -> TextEncoding { self.encoding }
    pub fn registry(&self) -> &TypeRegistry { &self.registry }

    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.registry.register(descriptor);
        self.type_cache.clear();
    }

    /// Register `T` and the types it refers to.
    pub fn register_type<T: Reflect>(&mut self) {
        if !self.registry.contains(T::TYPE_NAME) {
            T::register(&mut self.registry);
            self.type_cache.clear();
        }
    }

    /// Clear the type cache and reference tables.
    pub fn dispose(&mut self) {
        self.type_cache.clear();
        self.reset();
    }

    fn reset(&mut self) {
        self.visited.clear();
        self.instances.clear();
        self.depth = 0;
    }

    /// Run `step` one nesting level deeper, or fail with `exceeded` once the
    /// limit is reached.
    fn nested<T>(
        &mut self,
        exceeded: fn(String) -> GraphError,
        step: impl FnOnce(&mut Self) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        if self.depth >= self.max_depth {
            return Err(exceeded(format!("nesting deeper than {} levels", self.max_depth)));
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    fn resolve(&mut self, name: &str) -> Result<Arc<TypeDescriptor>, GraphError> {
        if let Some(d) = self.type_cache.get(name) {
            return Ok(Arc::clone(d));
        }
        let d = self
            .registry
            .resolve(name)
            .ok_or_else(|| GraphError::TypeResolution(name.to_owned()))?;
        debug!(type_name = name, resolved = d.name(), "type cache miss");
        self.type_cache.insert(name.to_owned(), Arc::clone(&d));
        Ok(d)
    }

    fn sequential(&self) -> ContainerOptions {
        ContainerOptions::new(Layout::Sequential).with_encoding(self.encoding)
    }

    // ── Serialize ────────────────────────────────────────────────────────────

    /// Encode the object `root` and everything reachable from it.
    pub fn serialize(&mut self, graph: &ObjectGraph, root: ObjectId) -> Result<Vec<u8>, GraphError> {
        if graph.get(root).is_none() {
            return Err(GraphError::Usage("root object is null".into()));
        }
        self.reset();
        let result = self.encode_object(graph, root);
        let objects = self.visited.len();
        self.reset();
        let bytes = result?;
        debug!(objects, bytes = bytes.len(), "graph serialized");
        Ok(bytes)
    }

    pub fn serialize_value<T: Reflect>(&mut self, value: &T) -> Result<Vec<u8>, GraphError> {
        self.register_type::<T>();
        let mut graph = ObjectGraph::new();
        let root = value.store(&mut graph)?;
        self.serialize(&graph, root)
    }

    fn encode_object(&mut self, graph: &ObjectGraph, id: ObjectId) -> Result<Vec<u8>, GraphError> {
        self.nested(GraphError::UnsupportedValue, |f| f.encode_fields(graph, id))
    }

    fn encode_fields(&mut self, graph: &ObjectGraph, id: ObjectId) -> Result<Vec<u8>, GraphError> {
        let next = self.visited.len() as i32;
        self.visited.entry(id).or_insert(next);

        let object = graph.object(id)?;
        let descriptor = self.resolve(object.type_name())?;
        if object.fields().len() != descriptor.fields().len() {
            return Err(GraphError::UnsupportedValue(format!(
                "{} holds {} field value(s) but its type declares {}",
                descriptor.name(),
                object.fields().len(),
                descriptor.fields().len()
            )));
        }

        let mut writer = SequenceWriter::new(Cursor::new(Vec::new()), self.sequential());
        for (field, value) in descriptor.fields().iter().zip(object.fields()) {
            let slot = self.encode_slot(graph, &field.kind, value)?;
            writer.add(slot)?;
        }
        writer.flush(false)?;
        Ok(writer.into_inner()?.into_inner())
    }

    /// `[marker][payload]` for one field or array element.
    fn encode_slot(&mut self, graph: &ObjectGraph, kind: &FieldKind, value: &Value) -> Result<Vec<u8>, GraphError> {
        match (kind, value) {
            (_, Value::Null) => Ok(vec![MARKER_NULL]),

            (FieldKind::Scalar(expected), Value::Scalar(s)) if s.kind() == *expected => {
                let mut out = vec![MARKER_VALUE];
                out.extend(s.encode(self.encoding));
                Ok(out)
            }

            // Zero-length arrays are written as null.
            (FieldKind::Array(_), Value::Array(items)) if items.is_empty() => Ok(vec![MARKER_NULL]),
            (FieldKind::Array(inner), Value::Array(items)) => {
                let mut out = vec![MARKER_VALUE];
                out.extend(self.encode_array(graph, inner, items)?);
                Ok(out)
            }

            (FieldKind::Object(_) | FieldKind::Dynamic, Value::Object(id)) => {
                self.encode_reference(graph, kind, *id)
            }

            (kind, value) => Err(GraphError::UnsupportedValue(format!(
                "{} value in a {kind} slot",
                value.describe()
            ))),
        }
    }

    fn encode_reference(&mut self, graph: &ObjectGraph, kind: &FieldKind, id: ObjectId) -> Result<Vec<u8>, GraphError> {
        if let Some(&index) = self.visited.get(&id) {
            trace!(index, "back-reference");
            let mut out = vec![MARKER_REF];
            out.extend_from_slice(&index.to_le_bytes());
            return Ok(out);
        }

        let type_name = graph.object(id)?.type_name().to_owned();
        let mut out = vec![MARKER_VALUE];
        match kind {
            FieldKind::Object(declared) => {
                let declared = self.resolve(declared)?;
                let actual = self.resolve(&type_name)?;
                if declared.name() != actual.name() {
                    return Err(GraphError::UnsupportedValue(format!(
                        "{} object in a slot declared as {}",
                        actual.name(),
                        declared.name()
                    )));
                }
            }
            _ => {
                let actual = self.resolve(&type_name)?;
                let name = actual.name().as_bytes();
                out.extend_from_slice(&(name.len() as i32).to_le_bytes());
                out.extend_from_slice(name);
            }
        }
        out.extend(self.encode_object(graph, id)?);
        Ok(out)
    }

    /// Sequential container of `(marker, payload)` pairs, one per element.
    fn encode_array(&mut self, graph: &ObjectGraph, inner: &FieldKind, items: &[Value]) -> Result<Vec<u8>, GraphError> {
        self.nested(GraphError::UnsupportedValue, |f| f.encode_elements(graph, inner, items))
    }

    fn encode_elements(&mut self, graph: &ObjectGraph, inner: &FieldKind, items: &[Value]) -> Result<Vec<u8>, GraphError> {
        let mut writer = SequenceWriter::new(Cursor::new(Vec::new()), self.sequential());
        for item in items {
            let mut slot = self.encode_slot(graph, inner, item)?;
            let payload = slot.split_off(1);
            writer.add(slot)?;
            writer.add(payload)?;
        }
        writer.flush(false)?;
        Ok(writer.into_inner()?.into_inner())
    }

    // ── Deserialize ──────────────────────────────────────────────────────────

    /// Decode bytes written by [`serialize`](Self::serialize) whose root is
    /// of type `type_name`.  Returns the rebuilt arena and its root.
    pub fn deserialize(&mut self, bytes: &[u8], type_name: &str) -> Result<(ObjectGraph, ObjectId), GraphError> {
        let descriptor = self.resolve(type_name)?;
        self.reset();
        let mut graph = ObjectGraph::new();
        let result = self.decode_object(&mut graph, &descriptor, bytes);
        self.reset();
        let root = result?;
        debug!(objects = graph.len(), root_type = descriptor.name(), "graph deserialized");
        Ok((graph, root))
    }

    pub fn deserialize_value<T: Reflect>(&mut self, bytes: &[u8]) -> Result<T, GraphError> {
        self.register_type::<T>();
        let (graph, root) = self.deserialize(bytes, T::TYPE_NAME)?;
        LoadContext::new(&graph).with_max_depth(self.max_depth).load(root)
    }

    fn decode_object(&mut self, graph: &mut ObjectGraph, descriptor: &TypeDescriptor, bytes: &[u8]) -> Result<ObjectId, GraphError> {
        self.nested(GraphError::Format, |f| f.decode_fields(graph, descriptor, bytes))
    }

    fn decode_fields(&mut self, graph: &mut ObjectGraph, descriptor: &TypeDescriptor, bytes: &[u8]) -> Result<ObjectId, GraphError> {
        // Register before any field so back-references to this object resolve.
        let id = graph.allocate(descriptor.name(), descriptor.fields().len());
        self.instances.push(id);

        let mut reader = SequenceReader::open(Cursor::new(bytes), self.sequential())?;
        reader.read_all(true)?;
        if reader.entry_count() != descriptor.fields().len() {
            return Err(GraphError::Format(format!(
                "{} declares {} field(s) but {} slot(s) were encoded",
                descriptor.name(),
                descriptor.fields().len(),
                reader.entry_count()
            )));
        }

        for (index, (field, entry)) in descriptor.fields().iter().zip(reader.entries()).enumerate() {
            let (&marker, payload) = entry
                .data()
                .split_first()
                .ok_or_else(|| GraphError::Format(format!("empty slot for field {}", field.name)))?;
            let value = self.decode_marked(graph, &field.kind, marker, payload)?;
            graph.set_field(id, index, value)?;
        }
        Ok(id)
    }

    fn decode_marked(&mut self, graph: &mut ObjectGraph, kind: &FieldKind, marker: u8, payload: &[u8]) -> Result<Value, GraphError> {
        match marker {
            MARKER_NULL => Ok(Value::Null),
            MARKER_REF => {
                if !kind.is_reference() {
                    return Err(GraphError::Format(format!("back-reference in a {kind} slot")));
                }
                let raw: [u8; 4] = payload.try_into().map_err(|_| {
                    GraphError::Format(format!("back-reference of {} byte(s)", payload.len()))
                })?;
                let index = i32::from_le_bytes(raw);
                usize::try_from(index)
                    .ok()
                    .and_then(|i| self.instances.get(i))
                    .map(|&id| Value::Object(id))
                    .ok_or_else(|| GraphError::Format(format!(
                        "back-reference {index} out of range ({} object(s) seen)",
                        self.instances.len()
                    )))
            }
            MARKER_VALUE => match kind {
                FieldKind::Scalar(k) => Ok(Value::Scalar(Scalar::decode(*k, payload, self.encoding)?)),
                FieldKind::Array(inner) => self.decode_array(graph, inner, payload),
                FieldKind::Object(name) => {
                    let descriptor = self.resolve(name)?;
                    Ok(Value::Object(self.decode_object(graph, &descriptor, payload)?))
                }
                FieldKind::Dynamic => {
                    let (name, body) = split_type_tag(payload)?;
                    let descriptor = self.resolve(name)?;
                    Ok(Value::Object(self.decode_object(graph, &descriptor, body)?))
                }
            },
            other => Err(GraphError::Format(format!("unknown slot marker {other}"))),
        }
    }

    fn decode_array(&mut self, graph: &mut ObjectGraph, inner: &FieldKind, bytes: &[u8]) -> Result<Value, GraphError> {
        self.nested(GraphError::Format, |f| f.decode_elements(graph, inner, bytes))
    }

    fn decode_elements(&mut self, graph: &mut ObjectGraph, inner: &FieldKind, bytes: &[u8]) -> Result<Value, GraphError> {
        let mut reader = SequenceReader::open(Cursor::new(bytes), self.sequential())?;
        reader.read_all(true)?;
        let entries = reader.entries();
        if entries.len() % 2 != 0 {
            return Err(GraphError::Format(format!(
                "array holds {} blob(s); elements come in pairs",
                entries.len()
            )));
        }

        let mut items = Vec::with_capacity(entries.len() / 2);
        for pair in entries.chunks_exact(2) {
            let marker = match pair[0].data() {
                [m] => *m,
                other => {
                    return Err(GraphError::Format(format!(
                        "array element marker of {} byte(s)",
                        other.len()
                    )))
                }
            };
            items.push(self.decode_marked(graph, inner, marker, pair[1].data())?);
        }
        Ok(Value::Array(items))
    }
}

/// Split `[i32 n][n bytes of UTF-8 type name][rest]`.
fn split_type_tag(payload: &[u8]) -> Result<(&str, &[u8]), GraphError> {
    if payload.len() < 4 {
        return Err(GraphError::Format("missing type tag".into()));
    }
    let (len_bytes, rest) = payload.split_at(4);
    let len = i32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    let len = usize::try_from(len)
        .ok()
        .filter(|&n| n <= rest.len())
        .ok_or_else(|| GraphError::Format(format!("type tag length {len} out of bounds")))?;
    let (name, body) = rest.split_at(len);
    let name = std::str::from_utf8(name)
        .map_err(|e| GraphError::Format(format!("type tag is not UTF-8: {e}")))?;
    Ok((name, body))
}
