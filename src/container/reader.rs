//! Container reader.
//!
//! Sequential layouts are read front to back from the stream's current
//! position until end-of-stream.  Indexed layouts load the directory while
//! opening and then read any inclusive range of entries by seeking straight
//! to it; bytes outside the requested range are never read.
//!
//! Decoded entries accumulate across reads (a ranged read appends to what is
//! already loaded) until [`SequenceReader::clear`] is called.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use tracing::{debug, trace};

use super::{ContainerError, ContainerOptions, Layout, SequenceWriter};
use crate::directory::IndexedDirectory;
use crate::entry::BlobEntry;
use crate::primitive::TextEncoding;

pub struct SequenceReader<R: Read + Seek> {
    stream:    Option<R>,
    layout:    Layout,
    encoding:  TextEncoding,
    entries:   Vec<BlobEntry>,
    /// name → position in `entries`; the most recently read entry wins.
    named:     HashMap<String, usize>,
    directory: Option<IndexedDirectory>,
}

impl<R: Read + Seek> SequenceReader<R> {
    /// Open a container.  Indexed layouts read their directory immediately;
    /// with `auto_read` every entry is read as well.
    pub fn open(mut stream: R, options: ContainerOptions) -> Result<Self, ContainerError> {
        let directory = if options.layout.is_indexed() {
            Some(IndexedDirectory::read_from(&mut stream)?)
        } else {
            None
        };

        let mut reader = Self {
            stream: Some(stream),
            layout: options.layout,
            encoding: options.encoding,
            entries: Vec::new(),
            named: HashMap::new(),
            directory,
        };
        if options.auto_read {
            reader.read_all(options.close_on_finish)?;
        }
        Ok(reader)
    }

    pub fn layout(&self) -> Layout { self.layout }
    pub fn encoding(&self) -> TextEncoding { self.encoding }
    pub fn is_closed(&self) -> bool { self.stream.is_none() }
    pub fn directory(&self) -> Option<&IndexedDirectory> { self.directory.as_ref() }

    /// Entries stored in an indexed stream, known without reading any data.
    pub fn available(&self) -> Result<usize, ContainerError> {
        Ok(self.indexed_directory()?.len())
    }

    /// Entries decoded so far.
    pub fn entry_count(&self) -> usize { self.entries.len() }
    pub fn entries(&self) -> &[BlobEntry] { &self.entries }
    pub fn get(&self, index: usize) -> Option<&BlobEntry> { self.entries.get(index) }

    pub fn get_named(&self, name: &str) -> Option<&BlobEntry> {
        self.named.get(name).map(|&i| &self.entries[i])
    }

    pub fn named_entries(&self) -> impl Iterator<Item = (&str, &BlobEntry)> {
        self.entries.iter().filter_map(|e| e.name().map(|n| (n, e)))
    }

    /// Forget every decoded entry.  The directory is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.named.clear();
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Read every entry.  Returns the number of entries now loaded.
    pub fn read_all(&mut self, close_stream: bool) -> Result<usize, ContainerError> {
        if self.layout.is_indexed() {
            let available = self.available()?;
            if available > 0 {
                self.read_indexed(0, available - 1)?;
            }
        } else {
            self.read_sequential()?;
        }
        self.finish(close_stream)
    }

    /// Read entries `index..available`.
    pub fn read_from(&mut self, index: usize, close_stream: bool) -> Result<usize, ContainerError> {
        let available = self.available()?;
        if index >= available {
            return Err(ContainerError::OutOfRange { index, available });
        }
        self.read_indexed(index, available - 1)?;
        self.finish(close_stream)
    }

    /// Read entries `first..=last`.
    pub fn read_range(&mut self, first: usize, last: usize, close_stream: bool) -> Result<usize, ContainerError> {
        self.read_indexed(first, last)?;
        self.finish(close_stream)
    }

    pub fn read_one(&mut self, index: usize, close_stream: bool) -> Result<usize, ContainerError> {
        self.read_range(index, index, close_stream)
    }

    /// Release the stream.  Decoded entries stay available.
    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn into_inner(mut self) -> Result<R, ContainerError> {
        self.stream.take().ok_or(ContainerError::Closed)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn indexed_directory(&self) -> Result<&IndexedDirectory, ContainerError> {
        self.directory.as_ref().ok_or_else(|| {
            ContainerError::Usage(format!(
                "random access requires an indexed layout, not {}",
                self.layout.name()
            ))
        })
    }

    fn finish(&mut self, close_stream: bool) -> Result<usize, ContainerError> {
        if close_stream {
            self.close();
        }
        Ok(self.entries.len())
    }

    fn push(&mut self, entry: BlobEntry) {
        if let Some(name) = entry.name() {
            self.named.insert(name.to_owned(), self.entries.len());
        }
        self.entries.push(entry);
    }

    fn read_sequential(&mut self) -> Result<(), ContainerError> {
        let stream = self.stream.as_mut().ok_or(ContainerError::Closed)?;
        let start = stream.stream_position()?;
        let end = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(start))?;

        let named = self.layout.is_named();
        let mut remaining = end.saturating_sub(start);
        let mut decoded = Vec::new();
        while remaining > 0 {
            let name = if named {
                let raw = read_block(stream, &mut remaining, "name")?;
                Some(self.encoding.decode(&raw)?)
            } else {
                None
            };
            let data = read_block(stream, &mut remaining, "payload")?;
            let length = data.len();
            decoded.push(BlobEntry::new(data, length, self.encoding, name));
        }

        trace!(entries = decoded.len(), bytes = end.saturating_sub(start), "sequential container read");
        for entry in decoded {
            self.push(entry);
        }
        Ok(())
    }

    fn read_indexed(&mut self, first: usize, last: usize) -> Result<(), ContainerError> {
        let directory = self.indexed_directory()?;
        let (offset, len) = directory.span(first, last)?;
        let spans: Vec<(usize, usize)> = directory.entries()[first..=last]
            .iter()
            .map(|e| (e.begin as usize, e.end as usize))
            .collect();
        let base = spans[0].0;

        let stream = self.stream.as_mut().ok_or(ContainerError::Closed)?;
        stream.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf)?;
        debug!(first, last, offset, bytes = len, "indexed range read");

        for (begin, end) in spans {
            let span = &buf[begin - base..end - base];
            let entry = if self.layout.is_named() {
                let (name, data) = split_named(span, self.encoding)?;
                BlobEntry::new(data.to_vec(), span.len(), self.encoding, Some(name))
            } else {
                BlobEntry::new(span.to_vec(), span.len(), self.encoding, None)
            };
            self.push(entry);
        }
        Ok(())
    }
}

impl<S: Read + Write + Seek> SequenceReader<S> {
    /// Turn an opened indexed reader into a writer that appends after its
    /// last entry.  See [`SequenceWriter::append`] for the caveats.
    pub fn into_appender(mut self) -> Result<SequenceWriter<S>, ContainerError> {
        let directory = self.indexed_directory()?.clone();
        let options = ContainerOptions::new(self.layout).with_encoding(self.encoding);
        let stream = self.stream.take().ok_or(ContainerError::Closed)?;
        SequenceWriter::append(stream, options, directory)
    }
}

/// Read one `[i32 len][bytes]` block, bounded by `remaining`.
fn read_block<R: Read>(stream: &mut R, remaining: &mut u64, what: &str) -> Result<Vec<u8>, ContainerError> {
    if *remaining < 4 {
        return Err(ContainerError::Format(format!(
            "truncated {what} length: {remaining} byte(s) left"
        )));
    }
    let len = stream.read_i32::<LittleEndian>()?;
    *remaining -= 4;
    if len < 0 || len as u64 > *remaining {
        return Err(ContainerError::Format(format!(
            "{what} length {len} does not fit the {remaining} remaining byte(s)"
        )));
    }
    let mut data = vec![0u8; len as usize];
    stream.read_exact(&mut data)?;
    *remaining -= len as u64;
    Ok(data)
}

/// Split an indexed named span into `[i32 name_len][name][payload]`.
fn split_named(span: &[u8], encoding: TextEncoding) -> Result<(String, &[u8]), ContainerError> {
    if span.len() < 4 {
        return Err(ContainerError::Format(format!(
            "named entry of {} byte(s) has no room for a name length",
            span.len()
        )));
    }
    let name_len = LittleEndian::read_i32(&span[..4]);
    if name_len < 0 || name_len as usize > span.len() - 4 {
        return Err(ContainerError::Format(format!(
            "name length {name_len} exceeds entry span of {} byte(s)",
            span.len()
        )));
    }
    let name_end = 4 + name_len as usize;
    let name = encoding.decode(&span[4..name_end])?;
    Ok((name, &span[name_end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(layout: Layout, blobs: &[&[u8]]) -> Cursor<Vec<u8>> {
        let mut w = SequenceWriter::new(Cursor::new(Vec::new()), ContainerOptions::new(layout));
        for b in blobs {
            w.add(b.to_vec()).unwrap();
        }
        w.flush(false).unwrap();
        let mut c = w.into_inner().unwrap();
        c.set_position(0);
        c
    }

    #[test]
    fn empty_sequential_stream_has_no_entries() {
        let mut r = SequenceReader::open(Cursor::new(Vec::new()), ContainerOptions::default()).unwrap();
        assert_eq!(r.read_all(true).unwrap(), 0);
        assert!(r.is_closed());
    }

    #[test]
    fn sequential_reads_from_current_position() {
        let mut bytes = vec![0xEE, 0xEE];
        bytes.extend_from_slice(&written(Layout::Sequential, &[b"xy"]).into_inner());
        let mut c = Cursor::new(bytes);
        c.set_position(2);
        let mut r = SequenceReader::open(c, ContainerOptions::default()).unwrap();
        r.read_all(false).unwrap();
        assert_eq!(r.get(0).unwrap().data(), b"xy");
    }

    #[test]
    fn truncated_sequential_stream_fails_fast() {
        let mut bytes = written(Layout::Sequential, &[b"hello"]).into_inner();
        bytes.pop();
        let mut r = SequenceReader::open(Cursor::new(bytes), ContainerOptions::default()).unwrap();
        assert!(matches!(r.read_all(false), Err(ContainerError::Format(_))));
    }

    #[test]
    fn negative_length_is_a_format_error() {
        let bytes = (-1i32).to_le_bytes().to_vec();
        let mut r = SequenceReader::open(Cursor::new(bytes), ContainerOptions::default()).unwrap();
        assert!(matches!(r.read_all(false), Err(ContainerError::Format(_))));
    }

    #[test]
    fn random_access_needs_indexed_layout() {
        let c = written(Layout::Sequential, &[b"a"]);
        let mut r = SequenceReader::open(c, ContainerOptions::default()).unwrap();
        assert!(matches!(r.available(), Err(ContainerError::Usage(_))));
        assert!(matches!(r.read_one(0, false), Err(ContainerError::Usage(_))));
    }

    #[test]
    fn indexed_out_of_range() {
        let c = written(Layout::Indexed, &[b"a", b"b"]);
        let mut r = SequenceReader::open(c, ContainerOptions::new(Layout::Indexed)).unwrap();
        assert_eq!(r.available().unwrap(), 2);
        assert!(matches!(r.read_one(2, false), Err(ContainerError::OutOfRange { index: 2, available: 2 })));
        assert!(matches!(r.read_from(5, false), Err(ContainerError::OutOfRange { .. })));
    }

    #[test]
    fn read_after_close_is_rejected() {
        let c = written(Layout::Indexed, &[b"a", b"b"]);
        let mut r = SequenceReader::open(c, ContainerOptions::new(Layout::Indexed)).unwrap();
        r.read_one(0, true).unwrap();
        assert!(matches!(r.read_one(1, false), Err(ContainerError::Closed)));
        assert_eq!(r.get(0).unwrap().data(), b"a");
    }

    #[test]
    fn split_named_rejects_oversized_name() {
        let mut span = 9i32.to_le_bytes().to_vec();
        span.extend_from_slice(b"abc");
        assert!(matches!(split_named(&span, TextEncoding::Utf8), Err(ContainerError::Format(_))));
    }
}
