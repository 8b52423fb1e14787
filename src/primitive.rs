//! Fixed-width primitive codec.
//!
//! Every scalar is stored little-endian at its natural width.  Text has no
//! length prefix of its own: the enclosing blob length delimits it, and its
//! bytes follow the configured [`TextEncoding`].
//!
//! | Kind   | Width | Layout                               |
//! |--------|-------|--------------------------------------|
//! | `bool` | 1     | `1` = true, anything else = false    |
//! | `u8`   | 1     |                                      |
//! | `i8`   | 1     |                                      |
//! | `i16`  | 2     | LE                                   |
//! | `u16`  | 2     | LE                                   |
//! | `i32`  | 4     | LE                                   |
//! | `u32`  | 4     | LE                                   |
//! | `i64`  | 8     | LE (`isize` widens to this)          |
//! | `u64`  | 8     | LE (`usize` widens to this)          |
//! | `f32`  | 4     | IEEE-754 LE                          |
//! | `f64`  | 8     | IEEE-754 LE                          |
//! | `char` | 4     | Unicode scalar value as LE `u32`     |
//! | text   | n     | encoded bytes, no terminator         |

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("Expected {expected} byte(s) for {kind}, got {actual}")]
    Width { kind: &'static str, expected: usize, actual: usize },
    #[error("Invalid {encoding} text: {reason}")]
    InvalidText { encoding: &'static str, reason: String },
    #[error("Invalid char scalar value {0:#x}")]
    InvalidChar(u32),
    #[error("Expected a {expected} value, found {found}")]
    KindMismatch { expected: &'static str, found: &'static str },
}

// ── TextEncoding ─────────────────────────────────────────────────────────────

/// Encoding applied to text values and to entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    /// Two bytes per UTF-16 code unit, little-endian.  The default.
    #[default]
    Utf16Le,
    /// 7-bit ASCII.  Characters outside the range are written as `?`.
    Ascii,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8    => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Ascii   => "ascii",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8"                          => Some(TextEncoding::Utf8),
            "utf16" | "utf-16" | "utf16le" | "utf-16le" | "unicode" => Some(TextEncoding::Utf16Le),
            "ascii"                                   => Some(TextEncoding::Ascii),
            _                                         => None,
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out
            }
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, PrimitiveError> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                PrimitiveError::InvalidText { encoding: self.name(), reason: e.to_string() }
            }),
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(PrimitiveError::InvalidText {
                        encoding: self.name(),
                        reason:   format!("odd byte length {}", bytes.len()),
                    });
                }
                let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
                String::from_utf16(&units).map_err(|e| PrimitiveError::InvalidText {
                    encoding: self.name(),
                    reason:   e.to_string(),
                })
            }
            TextEncoding::Ascii => Ok(bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect()),
        }
    }
}

// ── PrimitiveKind ────────────────────────────────────────────────────────────

/// Closed classification of every value the primitive codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
    Text,
}

impl PrimitiveKind {
    /// Fixed encoded width, `None` for text.
    pub fn width(self) -> Option<usize> {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::U8 | PrimitiveKind::I8 => Some(1),
            PrimitiveKind::I16 | PrimitiveKind::U16                     => Some(2),
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32
            | PrimitiveKind::Char                                        => Some(4),
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => Some(8),
            PrimitiveKind::Text                                          => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::U8   => "u8",
            PrimitiveKind::I8   => "i8",
            PrimitiveKind::I16  => "i16",
            PrimitiveKind::U16  => "u16",
            PrimitiveKind::I32  => "i32",
            PrimitiveKind::U32  => "u32",
            PrimitiveKind::I64  => "i64",
            PrimitiveKind::U64  => "u64",
            PrimitiveKind::F32  => "f32",
            PrimitiveKind::F64  => "f64",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Text => "text",
        }
    }
}

// ── Scalar ───────────────────────────────────────────────────────────────────

/// A dynamically typed primitive or text value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    Text(String),
}

impl Scalar {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Scalar::Bool(_) => PrimitiveKind::Bool,
            Scalar::U8(_)   => PrimitiveKind::U8,
            Scalar::I8(_)   => PrimitiveKind::I8,
            Scalar::I16(_)  => PrimitiveKind::I16,
            Scalar::U16(_)  => PrimitiveKind::U16,
            Scalar::I32(_)  => PrimitiveKind::I32,
            Scalar::U32(_)  => PrimitiveKind::U32,
            Scalar::I64(_)  => PrimitiveKind::I64,
            Scalar::U64(_)  => PrimitiveKind::U64,
            Scalar::F32(_)  => PrimitiveKind::F32,
            Scalar::F64(_)  => PrimitiveKind::F64,
            Scalar::Char(_) => PrimitiveKind::Char,
            Scalar::Text(_) => PrimitiveKind::Text,
        }
    }

    pub fn encode(&self, encoding: TextEncoding) -> Vec<u8> {
        match self {
            Scalar::Bool(v) => vec![u8::from(*v)],
            Scalar::U8(v)   => vec![*v],
            Scalar::I8(v)   => v.to_le_bytes().to_vec(),
            Scalar::I16(v)  => v.to_le_bytes().to_vec(),
            Scalar::U16(v)  => v.to_le_bytes().to_vec(),
            Scalar::I32(v)  => v.to_le_bytes().to_vec(),
            Scalar::U32(v)  => v.to_le_bytes().to_vec(),
            Scalar::I64(v)  => v.to_le_bytes().to_vec(),
            Scalar::U64(v)  => v.to_le_bytes().to_vec(),
            Scalar::F32(v)  => v.to_le_bytes().to_vec(),
            Scalar::F64(v)  => v.to_le_bytes().to_vec(),
            Scalar::Char(v) => u32::from(*v).to_le_bytes().to_vec(),
            Scalar::Text(v) => encoding.encode(v),
        }
    }

    pub fn decode(kind: PrimitiveKind, bytes: &[u8], encoding: TextEncoding) -> Result<Self, PrimitiveError> {
        if let Some(expected) = kind.width() {
            if bytes.len() != expected {
                return Err(PrimitiveError::Width { kind: kind.name(), expected, actual: bytes.len() });
            }
        }
        Ok(match kind {
            PrimitiveKind::Bool => Scalar::Bool(bytes[0] == 1),
            PrimitiveKind::U8   => Scalar::U8(bytes[0]),
            PrimitiveKind::I8   => Scalar::I8(bytes[0] as i8),
            PrimitiveKind::I16  => Scalar::I16(LittleEndian::read_i16(bytes)),
            PrimitiveKind::U16  => Scalar::U16(LittleEndian::read_u16(bytes)),
            PrimitiveKind::I32  => Scalar::I32(LittleEndian::read_i32(bytes)),
            PrimitiveKind::U32  => Scalar::U32(LittleEndian::read_u32(bytes)),
            PrimitiveKind::I64  => Scalar::I64(LittleEndian::read_i64(bytes)),
            PrimitiveKind::U64  => Scalar::U64(LittleEndian::read_u64(bytes)),
            PrimitiveKind::F32  => Scalar::F32(LittleEndian::read_f32(bytes)),
            PrimitiveKind::F64  => Scalar::F64(LittleEndian::read_f64(bytes)),
            PrimitiveKind::Char => {
                let raw = LittleEndian::read_u32(bytes);
                Scalar::Char(char::from_u32(raw).ok_or(PrimitiveError::InvalidChar(raw))?)
            }
            PrimitiveKind::Text => Scalar::Text(encoding.decode(bytes)?),
        })
    }
}

// ── Primitive trait ──────────────────────────────────────────────────────────

/// A Rust type with a fixed primitive wire representation.
pub trait Primitive: Sized {
    const KIND: PrimitiveKind;

    fn into_scalar(self) -> Scalar;
    fn from_scalar(scalar: Scalar) -> Option<Self>;

    fn encode(&self, encoding: TextEncoding) -> Vec<u8>
    where
        Self: Clone,
    {
        self.clone().into_scalar().encode(encoding)
    }

    fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<Self, PrimitiveError> {
        let scalar = Scalar::decode(Self::KIND, bytes, encoding)?;
        let found = scalar.kind().name();
        Self::from_scalar(scalar).ok_or(PrimitiveError::KindMismatch {
            expected: Self::KIND.name(),
            found,
        })
    }
}

macro_rules! impl_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$variant;

                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }

                fn from_scalar(scalar: Scalar) -> Option<Self> {
                    match scalar {
                        Scalar::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v)
                }
            }
        )*
    };
}

impl_primitive! {
    bool   => Bool,
    u8     => U8,
    i8     => I8,
    i16    => I16,
    u16    => U16,
    i32    => I32,
    u32    => U32,
    i64    => I64,
    u64    => U64,
    f32    => F32,
    f64    => F64,
    char   => Char,
    String => Text,
}

impl Primitive for isize {
    const KIND: PrimitiveKind = PrimitiveKind::I64;

    fn into_scalar(self) -> Scalar {
        Scalar::I64(self as i64)
    }

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::I64(v) => isize::try_from(v).ok(),
            _ => None,
        }
    }
}

impl Primitive for usize {
    const KIND: PrimitiveKind = PrimitiveKind::U64;

    fn into_scalar(self) -> Scalar {
        Scalar::U64(self as u64)
    }

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::U64(v) => usize::try_from(v).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_owned())
    }
}
