//! Record framing: the fixed in-record header, size limits, and the
//! CRC32C integrity check shared by the write and read paths.

use crate::stuff;
use std::io;
use thiserror::Error;

/// Maximum raw payload accepted on writes.
pub const MAX_WRITE_LEN: usize = 512;

/// Maximum encoded record accepted on reads. Twice the write limit, so a
/// future writer can grow the record schema without breaking old readers.
pub const MAX_READ_LEN: usize = 2 * MAX_WRITE_LEN;

/// Fixed header prefixed to every record: `crc: u32` then
/// `generation: u32`, both little-endian.
pub const RECORD_HEADER_LEN: usize = 8;

/// Value pre-filled into the `crc` field while checksumming. CRC32C is
/// weak against zero prefixes, so the seed keeps the leading record
/// bytes non-zero.
pub(crate) const CRC_SEED: u32 = u32::MAX;

// The largest encoded record a compliant writer can produce must fit
// within what readers accept.
const _: () = assert!(
    stuff::stuffed_bound_const(RECORD_HEADER_LEN + MAX_WRITE_LEN) <= MAX_READ_LEN
);

/// Failures on the stream write and read-setup paths. Corrupt records on
/// the read path are never reported through this type; the iterator
/// silently skips them.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("record payload of {len} bytes exceeds the {MAX_WRITE_LEN} byte write limit")]
    PayloadTooLarge { len: usize },
    #[error("{message}: {source}")]
    Io {
        message: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("short write left a partial record behind")]
    ShortWrite,
}

impl StreamError {
    /// The OS error number behind an I/O failure, when there is one.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            StreamError::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Frames `payload` behind a freshly checksummed header and stuffs the
/// whole record, trailing marker included.
pub(crate) fn encode_record(generation: u32, payload: &[u8]) -> Result<Vec<u8>, StreamError> {
    if payload.len() > MAX_WRITE_LEN {
        return Err(StreamError::PayloadTooLarge { len: payload.len() });
    }

    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    record.extend_from_slice(&CRC_SEED.to_le_bytes());
    record.extend_from_slice(&generation.to_le_bytes());
    record.extend_from_slice(payload);

    let crc = crc32c::crc32c(&record);
    record[..4].copy_from_slice(&crc.to_le_bytes());

    Ok(stuff::encode(&record))
}

/// Verifies the header checksum of a decoded record in place. The `crc`
/// field is overwritten with the seed, exactly as it was during
/// encoding, and left that way.
///
/// `decoded` must be at least [`RECORD_HEADER_LEN`] bytes.
pub(crate) fn crc_matches(decoded: &mut [u8]) -> bool {
    let stored = u32::from_le_bytes([decoded[0], decoded[1], decoded[2], decoded[3]]);
    decoded[..4].copy_from_slice(&CRC_SEED.to_le_bytes());
    stored == crc32c::crc32c(decoded)
}

/// Reads the generation field out of a decoded record header.
pub(crate) fn record_generation(decoded: &[u8]) -> u32 {
    u32::from_le_bytes([decoded[4], decoded[5], decoded[6], decoded[7]])
}
