use crate::graph::{GraphError, GraphFormatter, Reflect};
use crate::primitive::{Primitive, PrimitiveError, TextEncoding};

/// One decoded blob, as produced by a container read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    data:     Vec<u8>,
    /// Byte length of the entry's span on the wire.  For indexed named
    /// entries this includes the name prefix.
    length:   usize,
    name:     Option<String>,
    encoding: TextEncoding,
}

impl BlobEntry {
    pub(crate) fn new(data: Vec<u8>, length: usize, encoding: TextEncoding, name: Option<String>) -> Self {
        Self { data, length, name, encoding }
    }

    pub fn data(&self) -> &[u8] { &self.data }
    pub fn into_data(self) -> Vec<u8> { self.data }
    pub fn length(&self) -> usize { self.length }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn encoding(&self) -> TextEncoding { self.encoding }

    /// Decode the payload as a primitive using the entry's own encoding.
    pub fn decode<T: Primitive>(&self) -> Result<T, PrimitiveError> {
        T::decode(&self.data, self.encoding)
    }

    pub fn to_bool(&self)   -> Result<bool, PrimitiveError>   { self.decode() }
    pub fn to_u8(&self)     -> Result<u8, PrimitiveError>     { self.decode() }
    pub fn to_i16(&self)    -> Result<i16, PrimitiveError>    { self.decode() }
    pub fn to_i32(&self)    -> Result<i32, PrimitiveError>    { self.decode() }
    pub fn to_i64(&self)    -> Result<i64, PrimitiveError>    { self.decode() }
    pub fn to_f32(&self)    -> Result<f32, PrimitiveError>    { self.decode() }
    pub fn to_f64(&self)    -> Result<f64, PrimitiveError>    { self.decode() }
    pub fn to_char(&self)   -> Result<char, PrimitiveError>   { self.decode() }
    pub fn to_text(&self)   -> Result<String, PrimitiveError> { self.decode() }

    /// Decode the payload as text with an explicit encoding.
    pub fn to_text_with(&self, encoding: TextEncoding) -> Result<String, PrimitiveError> {
        encoding.decode(&self.data)
    }

    /// Decode the payload as a serialized object.
    pub fn decode_object<T: Reflect>(&self, formatter: &mut GraphFormatter) -> Result<T, GraphError> {
        formatter.deserialize_value::<T>(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_use_entry_encoding() {
        let entry = BlobEntry::new(TextEncoding::Ascii.encode("Alice?"), 6, TextEncoding::Ascii, None);
        assert_eq!(entry.to_text().unwrap(), "Alice?");
        assert!(entry.to_i32().is_err());

        let entry = BlobEntry::new(69i32.to_le_bytes().to_vec(), 4, TextEncoding::Utf16Le, Some("n".into()));
        assert_eq!(entry.to_i32().unwrap(), 69);
        assert_eq!(entry.name(), Some("n"));
    }
}
