//! Serialisation hooks. The stream stores opaque bytes; callers that
//! work with typed messages plug their codec in through these traits
//! instead of packing by hand.

/// A message that can report its packed size and serialise itself into a
/// caller-provided buffer.
pub trait PackedMessage {
    /// Upper bound on the packed size, in bytes.
    fn packed_size(&self) -> usize;

    /// Serialises into `dst` (at least [`packed_size`] bytes) and
    /// returns the number of bytes written, which may be smaller.
    ///
    /// [`packed_size`]: PackedMessage::packed_size
    fn pack(&self, dst: &mut [u8]) -> usize;
}

/// A message that can be reconstructed from a record payload.
pub trait UnpackMessage: Sized {
    /// Parses `payload`, or `None` if the bytes do not form a valid
    /// message. The iterator keeps scanning past unparseable records.
    fn unpack(payload: &[u8]) -> Option<Self>;
}
