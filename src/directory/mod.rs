//! Offset directory ("book") for the indexed layouts.
//!
//! The directory sits at the very end of the stream:
//!
//! ```text
//! [ data region ... ][ end_0: i32 LE ] ... [ end_{n-1}: i32 LE ][ dir_len: i64 LE ]
//! ```
//!
//! `dir_len` is the byte length of the offset sequence (`4 * n`).  Offsets
//! are relative to the first byte of the data region, so entry `i` spans
//! `end_{i-1}..end_i` with `end_{-1} = 0`.  The data region therefore starts
//! at `stream_len - 8 - dir_len - end_{n-1}`, which lets a container be
//! embedded after an arbitrary prefix.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use tracing::debug;

use crate::container::ContainerError;

/// Size of the trailing directory-length field.
pub const TRAILER_LEN: u64 = 8;
/// Size of one stored end offset.
pub const OFFSET_WIDTH: u64 = 4;

/// Half-open byte range of one entry, relative to the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub begin: u32,
    pub end:   u32,
}

impl DirectoryEntry {
    pub fn len(&self) -> u32 { self.end - self.begin }
    pub fn is_empty(&self) -> bool { self.begin == self.end }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexedDirectory {
    entries:    Vec<DirectoryEntry>,
    /// Absolute stream position of the data region.
    data_start: u64,
}

impl IndexedDirectory {
    pub fn new(data_start: u64) -> Self {
        Self { entries: Vec::new(), data_start }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[DirectoryEntry] { &self.entries }
    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> { self.entries.get(index) }
    pub fn data_start(&self) -> u64 { self.data_start }

    /// Relative end of the last entry.
    pub fn data_len(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.end as u64)
    }

    /// Absolute position where the trailer begins (and appends continue).
    pub fn data_end(&self) -> u64 {
        self.data_start + self.data_len()
    }

    /// Byte length of the serialized offset sequence.
    pub fn byte_length(&self) -> u64 {
        self.entries.len() as u64 * OFFSET_WIDTH
    }

    /// Record the next entry, `span_len` bytes long.
    pub fn push(&mut self, span_len: u64) -> Result<(), ContainerError> {
        let begin = self.data_len();
        let end = begin + span_len;
        if end > i32::MAX as u64 {
            return Err(ContainerError::Usage(format!(
                "indexed data region would reach {end} bytes; offsets are limited to {}",
                i32::MAX
            )));
        }
        self.entries.push(DirectoryEntry { begin: begin as u32, end: end as u32 });
        Ok(())
    }

    /// Validate an inclusive index range and return its absolute start and
    /// total byte length.
    pub fn span(&self, first: usize, last: usize) -> Result<(u64, u64), ContainerError> {
        let available = self.entries.len();
        if first >= available {
            return Err(ContainerError::OutOfRange { index: first, available });
        }
        if last >= available {
            return Err(ContainerError::OutOfRange { index: last, available });
        }
        if last < first {
            return Err(ContainerError::Usage(format!("range end {last} precedes begin {first}")));
        }
        let begin = self.entries[first].begin as u64;
        let end = self.entries[last].end as u64;
        Ok((self.data_start + begin, end - begin))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for entry in &self.entries {
            writer.write_i32::<LittleEndian>(entry.end as i32)?;
        }
        writer.write_i64::<LittleEndian>(self.byte_length() as i64)?;
        Ok(())
    }

    /// Locate and decode the directory from the end of `reader`.
    ///
    /// Only the trailer and the offset sequence are read; the data region is
    /// never touched.
    pub fn read_from<R: Read + Seek>(mut reader: R) -> Result<Self, ContainerError> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        if stream_len < TRAILER_LEN {
            return Err(ContainerError::Format(format!(
                "stream of {stream_len} bytes is too short for a directory trailer"
            )));
        }

        reader.seek(SeekFrom::Start(stream_len - TRAILER_LEN))?;
        let dir_len = reader.read_i64::<LittleEndian>()?;
        if dir_len < 0
            || dir_len as u64 % OFFSET_WIDTH != 0
            || dir_len as u64 > stream_len - TRAILER_LEN
        {
            return Err(ContainerError::Format(format!("invalid directory length {dir_len}")));
        }
        let dir_len = dir_len as u64;
        let dir_start = stream_len - TRAILER_LEN - dir_len;

        reader.seek(SeekFrom::Start(dir_start))?;
        let count = (dir_len / OFFSET_WIDTH) as usize;
        let mut entries = Vec::with_capacity(count);
        let mut begin = 0u32;
        for i in 0..count {
            let end = reader.read_i32::<LittleEndian>()?;
            if end < 0 || (end as u32) < begin {
                return Err(ContainerError::Format(format!(
                    "directory offset {i} ({end}) precedes previous end {begin}"
                )));
            }
            entries.push(DirectoryEntry { begin, end: end as u32 });
            begin = end as u32;
        }

        let data_len = begin as u64;
        if data_len > dir_start {
            return Err(ContainerError::Format(format!(
                "directory describes {data_len} data bytes but only {dir_start} precede it"
            )));
        }

        let directory = Self { entries, data_start: dir_start - data_len };
        debug!(
            entries = directory.len(),
            data_start = directory.data_start,
            dir_len,
            "indexed directory loaded"
        );
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn directory(spans: &[u64]) -> IndexedDirectory {
        let mut dir = IndexedDirectory::new(0);
        for &s in spans {
            dir.push(s).unwrap();
        }
        dir
    }

    #[test]
    fn entries_chain_from_zero() {
        let dir = directory(&[10, 32, 0, 18]);
        let ends: Vec<u32> = dir.entries().iter().map(|e| e.end).collect();
        assert_eq!(ends, vec![10, 42, 42, 60]);
        assert_eq!(dir.entries()[0].begin, 0);
        for pair in dir.entries().windows(2) {
            assert_eq!(pair[1].begin, pair[0].end);
        }
        assert!(dir.entries()[2].is_empty());
    }

    #[test]
    fn trailer_roundtrip_locates_data_after_prefix() {
        let dir = directory(&[3, 5]);
        let mut buf = b"PREFIX".to_vec();
        buf.extend_from_slice(&[7u8; 8]);
        dir.write_to(&mut buf).unwrap();

        let loaded = IndexedDirectory::read_from(Cursor::new(&buf)).unwrap();
        assert_eq!(loaded.entries(), dir.entries());
        assert_eq!(loaded.data_start(), 6);
        assert_eq!(loaded.data_end(), 14);
    }

    #[test]
    fn empty_directory_is_eight_zero_bytes() {
        let mut buf = Vec::new();
        IndexedDirectory::new(0).write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![0u8; 8]);
        let loaded = IndexedDirectory::read_from(Cursor::new(&buf)).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn span_covers_inclusive_range() {
        let dir = directory(&[4, 6, 8, 10]);
        assert_eq!(dir.span(1, 2).unwrap(), (4, 14));
        assert_eq!(dir.span(3, 3).unwrap(), (18, 10));
        assert!(matches!(dir.span(2, 4), Err(ContainerError::OutOfRange { index: 4, available: 4 })));
        assert!(matches!(dir.span(2, 1), Err(ContainerError::Usage(_))));
    }

    #[test]
    fn rejects_short_stream_and_bad_lengths() {
        assert!(matches!(
            IndexedDirectory::read_from(Cursor::new(vec![0u8; 4])),
            Err(ContainerError::Format(_))
        ));

        let mut buf = Vec::new();
        buf.extend_from_slice(&6i64.to_le_bytes());
        assert!(matches!(IndexedDirectory::read_from(Cursor::new(&buf)), Err(ContainerError::Format(_))));

        // Offset points past the start of the directory.
        let mut buf = Vec::new();
        buf.extend_from_slice(&100i32.to_le_bytes());
        buf.extend_from_slice(&4i64.to_le_bytes());
        assert!(matches!(IndexedDirectory::read_from(Cursor::new(&buf)), Err(ContainerError::Format(_))));
    }

    #[test]
    fn rejects_decreasing_offsets() {
        let mut buf = vec![0u8; 10];
        buf.extend_from_slice(&8i32.to_le_bytes());
        buf.extend_from_slice(&4i32.to_le_bytes());
        buf.extend_from_slice(&8i64.to_le_bytes());
        assert!(matches!(IndexedDirectory::read_from(Cursor::new(&buf)), Err(ContainerError::Format(_))));
    }
}
