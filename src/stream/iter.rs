//! Read path: a marker-scanning iterator that yields every valid record
//! in a byte range or a memory-mapped file, silently skipping anything
//! that fails to decode or checksum.

use super::msg::UnpackMessage;
use super::record::{crc_matches, record_generation, StreamError, MAX_READ_LEN, RECORD_HEADER_LEN};
use crate::stuff::{self, MARKER_LEN};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::os::unix::io::AsRawFd;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Caller-supplied opaque tag, stored verbatim at write time.
    pub generation: u32,
    pub payload: Vec<u8>,
}

enum Source<'a> {
    Slice(&'a [u8]),
    // Mapping released on drop; the descriptor itself stays with the
    // caller.
    Mapped(Mmap),
}

impl Source<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Source::Slice(buf) => buf,
            Source::Mapped(map) => map,
        }
    }
}

enum Scan {
    Record(StreamRecord),
    Invalid,
    Eof,
}

/// Iterator over the valid records of a stream.
///
/// All state is offset-based over the backing bytes. `stop_at` bounds
/// which records are *started*, not where scanning ends: a record whose
/// first byte lies before `stop_at` is yielded even if it runs past it.
/// Combined with [`locate_at`], that rule partitions a stream into
/// disjoint ranges whose workers collectively see every record exactly
/// once.
///
/// [`locate_at`]: RecordStreamIter::locate_at
pub struct RecordStreamIter<'a> {
    source: Source<'a>,
    cursor: usize,
    stop_at: usize,
    /// Everything before this offset is zero filler (a decayed sparse
    /// hole); no valid marker contains a zero byte.
    first_nonzero: usize,
    /// The first record of a stream may sit at the very start with no
    /// preceding marker; the file edge acts as one.
    first_record: bool,
}

impl<'a> RecordStreamIter<'a> {
    /// Scans records in a caller-held buffer.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self {
            source: Source::Slice(buf),
            cursor: 0,
            stop_at: buf.len(),
            first_nonzero: 0,
            first_record: true,
        }
    }

    /// Number of bytes in the stream.
    pub fn size(&self) -> usize {
        self.source.bytes().len()
    }

    /// Repositions the iterator to start scanning at `start_offset`.
    ///
    /// Rejects offsets inside the leading zero run or past the stop
    /// offset. Anywhere but the first data byte, the iterator
    /// resynchronises on the next marker before yielding anything.
    pub fn locate_at(&mut self, start_offset: usize) -> bool {
        if start_offset < self.first_nonzero || start_offset > self.stop_at {
            return false;
        }

        if start_offset == self.first_nonzero {
            self.first_record = true;
            self.cursor = self.first_nonzero;
            return true;
        }

        self.first_record = false;
        self.cursor = start_offset;
        true
    }

    /// Stops the iterator from yielding records whose first byte is at
    /// or after `stop_offset`. Out-of-range offsets are ignored.
    pub fn set_stop_at(&mut self, stop_offset: usize) {
        if stop_offset > self.size() {
            return;
        }
        self.stop_at = stop_offset;
    }

    /// Skips past records whose payload `M` cannot parse and returns the
    /// next record that unpacks cleanly, with its generation.
    pub fn next_msg<M: UnpackMessage>(&mut self) -> Option<(u32, M)> {
        for record in self.by_ref() {
            if let Some(message) = M::unpack(&record.payload) {
                return Some((record.generation, message));
            }
        }
        None
    }

    /// Consumes and attempts to validate one candidate record.
    fn next_candidate(&mut self) -> Scan {
        let bytes = self.source.bytes();

        let header_at;
        let data_start;
        if self.first_record {
            // Streams are delimited by *trailing* markers, so the first
            // record has none in front of it.
            self.first_record = false;
            header_at = self.cursor;
            data_start = self.cursor;
        } else {
            let found = self.cursor + stuff::find_marker(&bytes[self.cursor..]);
            if found >= self.stop_at {
                return Scan::Eof;
            }
            header_at = found;
            data_start = found + MARKER_LEN;
        }

        if header_at >= self.stop_at {
            return Scan::Eof;
        }

        // The record may legitimately end past `stop_at`, so the scan
        // for its end runs to the end of the data.
        let next_marker = data_start + stuff::find_marker(&bytes[data_start..]);
        self.cursor = next_marker;
        let encoded = &bytes[data_start..next_marker];

        if encoded.len() > MAX_READ_LEN {
            return Scan::Invalid;
        }

        let mut decoded = match stuff::decode(encoded) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!(
                    "event=record_candidate_skipped offset={} len={} reason={}",
                    header_at,
                    encoded.len(),
                    err
                );
                return Scan::Invalid;
            }
        };

        if decoded.len() < RECORD_HEADER_LEN {
            return Scan::Invalid;
        }
        if !crc_matches(&mut decoded) {
            debug!(
                "event=record_candidate_skipped offset={} len={} reason=crc_mismatch",
                header_at,
                encoded.len()
            );
            return Scan::Invalid;
        }

        let generation = record_generation(&decoded);
        let payload = decoded.split_off(RECORD_HEADER_LEN);
        Scan::Record(StreamRecord {
            generation,
            payload,
        })
    }
}

impl RecordStreamIter<'static> {
    /// Scans records in a memory-mapped file.
    ///
    /// The descriptor is only borrowed for the `mmap` and may be
    /// repositioned; the mapping lives with the iterator. A leading
    /// sparse hole is skipped with `SEEK_DATA`, then any remaining zero
    /// filler byte by byte, since filesystems materialise holes as
    /// zeros.
    pub fn from_file(fd: &File) -> Result<Self, StreamError> {
        let metadata = fd.metadata().map_err(|source| StreamError::Io {
            message: "failed to stat record stream",
            source,
        })?;
        if metadata.len() == 0 {
            return Ok(Self::from_slice(&[]));
        }

        // Best effort: an error (e.g. an unsupported filesystem) just
        // means scanning starts at offset zero.
        let first_data = unsafe { libc::lseek(fd.as_raw_fd(), 0, libc::SEEK_DATA) };

        let map = unsafe { Mmap::map(fd) }.map_err(|source| StreamError::Io {
            message: "failed to mmap record stream",
            source,
        })?;

        let size = map.len();
        let mut cursor = if first_data > 0 {
            (first_data as usize).min(size)
        } else {
            0
        };
        while cursor < size && map[cursor] == 0 {
            cursor += 1;
        }

        Ok(Self {
            source: Source::Mapped(map),
            cursor,
            stop_at: size,
            first_nonzero: cursor,
            first_record: true,
        })
    }
}

impl Iterator for RecordStreamIter<'_> {
    type Item = StreamRecord;

    fn next(&mut self) -> Option<StreamRecord> {
        while self.cursor < self.stop_at {
            match self.next_candidate() {
                Scan::Record(record) => return Some(record),
                Scan::Invalid => continue,
                Scan::Eof => break,
            }
        }

        // Exhausted; park the cursor at the end so every further call is
        // a cheap EOF.
        self.cursor = self.size();
        None
    }
}
