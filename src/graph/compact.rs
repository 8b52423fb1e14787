//! One-shot helpers.  Each call builds a fresh formatter, so there is no
//! shared cache and no cross-call state.

use super::{FormatterOptions, GraphError, GraphFormatter, Reflect, TypeRegistry};
use crate::primitive::TextEncoding;

pub fn serialize<T: Reflect>(value: &T) -> Result<Vec<u8>, GraphError> {
    serialize_with(value, TextEncoding::default())
}

pub fn serialize_with<T: Reflect>(value: &T, encoding: TextEncoding) -> Result<Vec<u8>, GraphError> {
    formatter(encoding).serialize_value(value)
}

pub fn deserialize<T: Reflect>(bytes: &[u8]) -> Result<T, GraphError> {
    deserialize_with(bytes, TextEncoding::default())
}

pub fn deserialize_with<T: Reflect>(bytes: &[u8], encoding: TextEncoding) -> Result<T, GraphError> {
    formatter(encoding).deserialize_value(bytes)
}

fn formatter(encoding: TextEncoding) -> GraphFormatter {
    GraphFormatter::new(TypeRegistry::new(), FormatterOptions::default().with_encoding(encoding))
}
