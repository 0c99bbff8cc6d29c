//! Corruption-resilient, self-synchronising record streams for small
//! append-only log files.
//!
//! Records are word-stuffed so the 2-byte marker `0xFE 0xFD` never
//! appears inside an encoded record, then written with a trailing
//! marker. Any local corruption (overwritten bytes, zeroed pages,
//! short writes, inserted or dropped bytes) damages at most the
//! records overlapping the corrupt region; everything else stays
//! independently decodable. Readers scan for markers, decode each
//! candidate, and drop anything that fails validation or its CRC32C.
//!
//! The crate does not replicate, index, compress, or repair data, and
//! relies on `O_APPEND` semantics for multi-writer safety.
#![deny(unreachable_pub)]
#![deny(unused_must_use)]

pub mod stream;
pub mod stuff;

pub use stream::{
    append_buf, append_initial, append_msg, write_buf, write_initial, write_msg, PackedMessage,
    RecordStreamIter, StreamError, StreamRecord, UnpackMessage, MAX_READ_LEN, MAX_WRITE_LEN,
    RECORD_HEADER_LEN,
};
pub use stuff::{
    decode, encode, find_marker, push_marker, stuffed_bound, stuffed_bound_const, StuffError,
    MARKER, MARKER_LEN, MAX_FIRST_RUN, MAX_RUN,
};
