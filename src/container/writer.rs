//! Container writer.
//!
//! Entries accumulate in memory through the `add*` calls and are written in
//! insertion order by [`SequenceWriter::flush`], which then clears the
//! pending batch.  Sequential layouts simply append each batch; indexed
//! layouts extend one directory and rewrite the trailer on every flush.
//!
//! # Appending to an indexed stream
//! [`SequenceWriter::append`] (or `SequenceReader::into_appender`) takes the
//! directory of an existing indexed stream, seeks to where its trailer
//! begins, and writes new entries over it followed by a trailer covering old
//! and new entries.  Existing payload bytes are never rewritten.
//!
//! The caller owns two hazards here:
//! - **Single writer.** Nothing coordinates concurrent appenders.
//! - **No crash atomicity.** Once the old trailer is overwritten the stream
//!   has no valid directory until the new trailer is fully written.  A
//!   failure in between leaves the stream unreadable as an indexed container.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, trace};

use super::{ContainerError, ContainerOptions, Layout};
use crate::directory::IndexedDirectory;
use crate::primitive::{Scalar, TextEncoding};

pub struct SequenceWriter<W: Write + Seek> {
    stream:     Option<W>,
    layout:     Layout,
    encoding:   TextEncoding,

    unnamed:    Vec<Vec<u8>>,
    /// Insertion-ordered named entries; `name_slots` maps a name to its slot.
    named:      Vec<(String, Vec<u8>)>,
    name_slots: HashMap<String, usize>,

    /// Indexed layouts only.  `None` until the first flush of a fresh writer.
    directory:  Option<IndexedDirectory>,
}

impl<W: Write + Seek> SequenceWriter<W> {
    pub fn new(stream: W, options: ContainerOptions) -> Self {
        Self {
            stream:     Some(stream),
            layout:     options.layout,
            encoding:   options.encoding,
            unnamed:    Vec::new(),
            named:      Vec::new(),
            name_slots: HashMap::new(),
            directory:  None,
        }
    }

    /// Continue an existing indexed stream described by `directory`.
    ///
    /// See the module docs for the single-writer and crash-atomicity caveats.
    pub fn append(stream: W, options: ContainerOptions, directory: IndexedDirectory) -> Result<Self, ContainerError> {
        if !options.layout.is_indexed() {
            return Err(ContainerError::Usage(format!(
                "cannot append to a {} container",
                options.layout.name()
            )));
        }
        debug!(
            existing = directory.len(),
            resume_at = directory.data_end(),
            "opening indexed container for append"
        );
        let mut writer = Self::new(stream, options);
        writer.directory = Some(directory);
        Ok(writer)
    }

    pub fn layout(&self) -> Layout { self.layout }
    pub fn encoding(&self) -> TextEncoding { self.encoding }
    pub fn is_closed(&self) -> bool { self.stream.is_none() }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        if self.layout.is_named() { self.named.len() } else { self.unnamed.len() }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Directory as of the last flush (indexed layouts only).
    pub fn directory(&self) -> Option<&IndexedDirectory> { self.directory.as_ref() }

    // ── Adding entries ───────────────────────────────────────────────────────

    pub fn add(&mut self, data: impl Into<Vec<u8>>) -> Result<(), ContainerError> {
        if self.layout.is_named() {
            return Err(ContainerError::Usage(
                "can't add data without a name to a named sequence".into(),
            ));
        }
        self.unnamed.push(data.into());
        Ok(())
    }

    /// Add a primitive or text value through the primitive codec.
    pub fn add_value(&mut self, value: impl Into<Scalar>) -> Result<(), ContainerError> {
        let bytes = value.into().encode(self.encoding);
        self.add(bytes)
    }

    /// Add a named blob.  Re-using a pending name replaces its payload but
    /// keeps the original position.
    pub fn add_named(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), ContainerError> {
        if !self.layout.is_named() {
            return Err(ContainerError::Usage(
                "can't add a name to the data in an unnamed sequence".into(),
            ));
        }
        let data = data.into();
        match self.name_slots.get(name) {
            Some(&slot) => self.named[slot].1 = data,
            None => {
                self.name_slots.insert(name.to_owned(), self.named.len());
                self.named.push((name.to_owned(), data));
            }
        }
        Ok(())
    }

    pub fn add_named_value(&mut self, name: &str, value: impl Into<Scalar>) -> Result<(), ContainerError> {
        let bytes = value.into().encode(self.encoding);
        self.add_named(name, bytes)
    }

    /// Drop every pending entry without writing it.
    pub fn clear(&mut self) {
        self.unnamed.clear();
        self.named.clear();
        self.name_slots.clear();
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Write the pending batch, clear it, and optionally close the stream.
    pub fn flush(&mut self, close_stream: bool) -> Result<(), ContainerError> {
        let count = self.len();
        let stream = self.stream.as_mut().ok_or(ContainerError::Closed)?;

        if self.layout.is_indexed() {
            // A fresh writer anchors its directory at the current position
            // so a retried flush resumes from the same place.
            let mut directory = match self.directory.as_ref() {
                Some(committed) => committed.clone(),
                None => {
                    let fresh = IndexedDirectory::new(stream.stream_position()?);
                    self.directory = Some(fresh.clone());
                    fresh
                }
            };
            let resume_at = directory.data_end();

            // Stage every span first: an entry that would overflow the
            // offset range rejects the batch before any byte is written.
            let names: Vec<Vec<u8>> = self.named.iter().map(|(name, _)| self.encoding.encode(name)).collect();
            if self.layout.is_named() {
                for (name, (_, data)) in names.iter().zip(&self.named) {
                    directory.push(4 + name.len() as u64 + data.len() as u64)?;
                }
            } else {
                for data in &self.unnamed {
                    directory.push(data.len() as u64)?;
                }
            }

            // Overwrite the old trailer.
            stream.seek(SeekFrom::Start(resume_at))?;
            if self.layout.is_named() {
                for (name, (_, data)) in names.iter().zip(&self.named) {
                    write_len_prefixed(stream, name)?;
                    stream.write_all(data)?;
                }
            } else {
                for data in &self.unnamed {
                    stream.write_all(data)?;
                }
            }
            directory.write_to(&mut *stream)?;

            debug!(
                layout = self.layout.name(),
                written = count,
                total = directory.len(),
                data_end = directory.data_end(),
                "indexed container flushed"
            );
            self.directory = Some(directory);
        } else {
            let mut bytes = 0u64;
            if self.layout.is_named() {
                for (name, data) in &self.named {
                    bytes += write_len_prefixed(stream, &self.encoding.encode(name))?;
                    bytes += write_len_prefixed(stream, data)?;
                }
            } else {
                for data in &self.unnamed {
                    bytes += write_len_prefixed(stream, data)?;
                }
            }
            trace!(layout = self.layout.name(), written = count, bytes, "sequential container flushed");
        }

        stream.flush()?;
        self.clear();
        if close_stream {
            self.close();
        }
        Ok(())
    }

    /// Drop pending entries and release the stream.
    pub fn close(&mut self) {
        self.clear();
        self.stream = None;
    }

    /// Recover the underlying stream.  Pending entries are discarded.
    pub fn into_inner(mut self) -> Result<W, ContainerError> {
        self.clear();
        self.stream.take().ok_or(ContainerError::Closed)
    }
}

/// Write `[i32 len][data]`, returning the bytes written.
fn write_len_prefixed<W: Write>(stream: &mut W, data: &[u8]) -> Result<u64, ContainerError> {
    let len = i32::try_from(data.len()).map_err(|_| {
        ContainerError::Usage(format!("blob of {} bytes exceeds the i32 length field", data.len()))
    })?;
    stream.write_i32::<LittleEndian>(len)?;
    stream.write_all(data)?;
    Ok(4 + data.len() as u64)
}
