//! Word-stuffing codec: re-encodes arbitrary bytes so the 2-byte marker
//! sequence never appears in the output, with bounded overhead.
//!
//! The format is a byte-sequence variant of consistent overhead byte
//! stuffing. Runs of literal bytes are prefixed with their length in
//! radix 253: a single digit for the first run of a record, two
//! little-endian digits afterwards. A run shorter than its cap implies a
//! marker immediately after it; a run exactly at its cap implies nothing.
//! Every record is encoded as if a marker followed its last byte, so the
//! decoder knows where a well-formed record ends.

use thiserror::Error;

/// The reserved 2-byte sequence. Never appears inside encoded bytes; used
/// as the record delimiter by the stream layer.
pub const MARKER: [u8; 2] = [0xFE, 0xFD];

/// Length of [`MARKER`].
pub const MARKER_LEN: usize = MARKER.len();

/// Base for run-length digits. A digit is always strictly below
/// `MARKER[0]`, so a length field can never form the marker with a
/// neighbouring byte.
const RADIX: usize = 0xFD;

/// Cap for the first run of a record (single-digit length).
pub const MAX_FIRST_RUN: usize = RADIX - 1;

/// Cap for every run after the first (two-digit length).
pub const MAX_RUN: usize = RADIX * RADIX - 1;

/// Decode failure. The stream layer treats any of these as "not a
/// record" and keeps scanning; they are only surfaced to direct codec
/// users.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum StuffError {
    #[error("encoded input truncated")]
    Truncated,
    #[error("run length exceeds its cap")]
    RunTooLong,
}

/// Returns the offset of the first occurrence of [`MARKER`] in `data`,
/// or `data.len()` if absent. Matches may start at any byte offset;
/// candidate pairs overlap.
pub fn find_marker(data: &[u8]) -> usize {
    if data.len() < MARKER_LEN {
        return data.len();
    }
    let needle = u16::from_le_bytes(MARKER);
    for i in 0..data.len() - 1 {
        if u16::from_le_bytes([data[i], data[i + 1]]) == needle {
            return i;
        }
    }
    data.len()
}

/// Appends the 2-byte marker to `dst`.
pub fn push_marker(dst: &mut Vec<u8>) {
    dst.extend_from_slice(&MARKER);
}

/// Worst-case encoded size for `len` input bytes, exact per the encoding
/// rules. `with_marker` also counts the trailing 2-byte marker.
///
/// Returns `None` when `len` is too large to be a real buffer size.
pub fn stuffed_bound(len: usize, with_marker: bool) -> Option<usize> {
    if len > isize::MAX as usize {
        return None;
    }

    // One byte for the initial run header, plus the trailer if requested.
    let mut bound = len + if with_marker { MARKER_LEN + 1 } else { 1 };
    if len < MAX_FIRST_RUN {
        return Some(bound);
    }

    // One 2-byte header per remaining run, including the last partial or
    // empty one.
    let rest = len - MAX_FIRST_RUN;
    bound += MARKER_LEN * (1 + rest / MAX_RUN);
    Some(bound)
}

/// Constant over-approximation of [`stuffed_bound`] including the
/// trailer, usable to size fixed buffers. Monotonic in `len` and never
/// below the exact bound.
pub const fn stuffed_bound_const(len: usize) -> usize {
    MARKER_LEN + len + MARKER_LEN * (2 + len / (RADIX * RADIX - 1))
}

/// Encodes `src` so the output contains no [`MARKER`], then appends the
/// trailing marker that delimits the record.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(stuffed_bound_const(src.len()));
    let mut rest = src;
    let mut first = true;

    loop {
        let cap = if first { MAX_FIRST_RUN } else { MAX_RUN };
        let window = cap.min(rest.len());
        let run = find_marker(&rest[..window]);

        if first {
            dst.push(run as u8);
            first = false;
        } else {
            dst.push((run % RADIX) as u8);
            dst.push((run / RADIX) as u8);
        }
        dst.extend_from_slice(&rest[..run]);
        rest = &rest[run..];

        if run < cap {
            // A short run is implicitly followed by a marker: either the
            // virtual terminator (end of input) or a real one in `rest`.
            if rest.is_empty() {
                break;
            }
            debug_assert_eq!(rest[..MARKER_LEN], MARKER);
            rest = &rest[MARKER_LEN..];
        }
    }

    push_marker(&mut dst);
    dst
}

/// Decodes stuffed bytes. `src` must not include the trailing marker;
/// the caller delimits the input at the next marker or end of data.
///
/// Never produces more than `src.len() - 1` bytes of output.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, StuffError> {
    let mut out = Vec::with_capacity(src.len().saturating_sub(1));
    let mut rest = src;
    let mut first = true;

    loop {
        let cap;
        let run;
        if first {
            first = false;
            let (&len, tail) = rest.split_first().ok_or(StuffError::Truncated)?;
            cap = MAX_FIRST_RUN;
            run = len as usize;
            rest = tail;
        } else {
            if rest.len() < MARKER_LEN {
                return Err(StuffError::Truncated);
            }
            cap = MAX_RUN;
            run = rest[0] as usize + RADIX * rest[1] as usize;
            rest = &rest[MARKER_LEN..];
        }

        if run > cap {
            return Err(StuffError::RunTooLong);
        }
        if run > rest.len() {
            return Err(StuffError::Truncated);
        }
        out.extend_from_slice(&rest[..run]);
        rest = &rest[run..];

        if run < cap {
            // The implicit marker: the virtual terminator if the input is
            // exhausted, a literal marker otherwise.
            if rest.is_empty() {
                break;
            }
            // A non-terminal short run must leave room for the next
            // header; checking before the write keeps output strictly
            // below the input size.
            if rest.len() < MARKER_LEN {
                return Err(StuffError::Truncated);
            }
            push_marker(&mut out);
        }
    }

    Ok(out)
}
