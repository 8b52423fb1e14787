//! Blob-sequence container: layouts, options and errors.
//!
//! A container packs an ordered batch of byte blobs into a stream.  Four
//! layouts exist; all integers are little-endian:
//!
//! | Layout            | Per entry                                     | Trailer              |
//! |-------------------|-----------------------------------------------|----------------------|
//! | `Sequential`      | `[i32 len][payload]`                          | none                 |
//! | `SequentialNamed` | `[i32 name_len][name][i32 len][payload]`      | none                 |
//! | `Indexed`         | `[payload]`                                   | offset directory     |
//! | `IndexedNamed`    | `[i32 name_len][name][payload]`               | offset directory     |
//!
//! Sequential streams are read front to back until end-of-stream.  Indexed
//! streams are opened from the end: the trailer is read first and entries are
//! then fetched by seeking (see [`crate::directory`]).

pub mod reader;
pub mod writer;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitive::{PrimitiveError, TextEncoding};

pub use reader::SequenceReader;
pub use writer::SequenceWriter;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Malformed, truncated, or layout-mismatched stream.
    #[error("Format error: {0}")]
    Format(String),
    /// The caller broke the container contract (named/unnamed mix, etc.).
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("Entry index {index} out of range ({available} available)")]
    OutOfRange { index: usize, available: usize },
    #[error("Stream already closed")]
    Closed,
    #[error("Primitive error: {0}")]
    Primitive(#[from] PrimitiveError),
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    Sequential,
    SequentialNamed,
    Indexed,
    IndexedNamed,
}

impl Layout {
    pub fn is_named(self) -> bool {
        matches!(self, Layout::SequentialNamed | Layout::IndexedNamed)
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, Layout::Indexed | Layout::IndexedNamed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Layout::Sequential      => "sequential",
            Layout::SequentialNamed => "sequential-named",
            Layout::Indexed         => "indexed",
            Layout::IndexedNamed    => "indexed-named",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential"       => Some(Layout::Sequential),
            "sequential-named" => Some(Layout::SequentialNamed),
            "indexed"          => Some(Layout::Indexed),
            "indexed-named"    => Some(Layout::IndexedNamed),
            _                  => None,
        }
    }
}

// ── ContainerOptions ─────────────────────────────────────────────────────────

/// Configuration for [`SequenceWriter`] and [`SequenceReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    pub layout:         Layout,
    /// Applied to entry names and to text values passed to `add_value`.
    pub encoding:       TextEncoding,
    /// Reader only: read every entry while opening.
    pub auto_read:      bool,
    /// Reader only: close the stream after the automatic read.
    pub close_on_finish: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            layout:          Layout::Sequential,
            encoding:        TextEncoding::default(),
            auto_read:       false,
            close_on_finish: true,
        }
    }
}

impl ContainerOptions {
    pub fn new(layout: Layout) -> Self {
        Self { layout, ..Self::default() }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_auto_read(mut self, auto_read: bool) -> Self {
        self.auto_read = auto_read;
        self
    }

    pub fn with_close_on_finish(mut self, close: bool) -> Self {
        self.close_on_finish = close;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_names_roundtrip() {
        for layout in [Layout::Sequential, Layout::SequentialNamed, Layout::Indexed, Layout::IndexedNamed] {
            assert_eq!(Layout::from_name(layout.name()), Some(layout));
        }
        assert_eq!(Layout::from_name("book"), None);
    }

    #[test]
    fn options_load_from_json_with_defaults() {
        let opts: ContainerOptions =
            serde_json::from_str(r#"{ "layout": "indexed-named", "encoding": "ascii" }"#).unwrap();
        assert_eq!(opts.layout, Layout::IndexedNamed);
        assert_eq!(opts.encoding, TextEncoding::Ascii);
        assert!(!opts.auto_read);
        assert!(opts.close_on_finish);
    }
}
