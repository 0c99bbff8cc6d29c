//! Write path: vectored appends to an `O_APPEND` descriptor with a
//! bounded retry policy, plus no-retry variants for buffered streams.

use super::msg::PackedMessage;
use super::record::{encode_record, StreamError, MAX_WRITE_LEN};
use crate::stuff::{MARKER, MARKER_LEN};
use log::warn;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;

const APPEND_ATTEMPTS: usize = 3;

/// Repeatedly attempts to append `buf` to `fd`.
///
/// `buf` is a stuffed record ending with a marker for the next record.
/// The first attempt assumes the previous append left that marker in
/// place; once a short write is observed, that assumption is off and
/// every further attempt prepends an explicit marker anchor.
fn append_to_fd(fd: &File, buf: &[u8]) -> Result<(), StreamError> {
    let anchor = MARKER;
    let mut iov = [
        // Grown to hold the marker after the first short write.
        libc::iovec {
            iov_base: anchor.as_ptr() as *mut libc::c_void,
            iov_len: 0,
        },
        libc::iovec {
            iov_base: buf.as_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        },
    ];
    let mut expected = buf.len();
    let mut partial_write = false;
    let mut written: isize = -1;

    for attempt in 1..=APPEND_ATTEMPTS {
        written = unsafe { libc::writev(fd.as_raw_fd(), iov.as_ptr(), iov.len() as libc::c_int) };
        if written >= 0 && written as usize == expected {
            break;
        }

        // Nothing went out; just try again.
        if written <= 0 {
            continue;
        }

        // Short write. A partial record may now sit in the file; the
        // read side will reject it on CRC. From here on we cannot trust
        // the previous trailing marker, so anchor the retry explicitly.
        partial_write = true;
        iov[0].iov_len = MARKER_LEN;
        expected = buf.len() + MARKER_LEN;
        warn!(
            "event=record_append_retry attempt={} written={} expected={}",
            attempt, written, expected
        );
    }

    let err = io::Error::last_os_error();
    let complete = written >= 0 && written as usize == expected;

    // Out of attempts with partial data behind us: best effort to leave
    // a clean boundary for the next writer. Failure here changes
    // nothing, the stream is already short.
    if partial_write && !complete {
        let r = unsafe {
            libc::write(
                fd.as_raw_fd(),
                anchor.as_ptr() as *const libc::c_void,
                MARKER_LEN,
            )
        };
        if r != MARKER_LEN as isize {
            warn!(
                "event=record_append_anchor_failed error={}",
                io::Error::last_os_error()
            );
        }
    }

    if written < 0 {
        return Err(StreamError::Io {
            message: "record stream writev failed",
            source: err,
        });
    }
    if !complete {
        return Err(StreamError::ShortWrite);
    }
    Ok(())
}

fn ends_with_marker(mut fd: &File) -> bool {
    let mut tail = [0u8; MARKER_LEN];
    if fd.seek(SeekFrom::End(-(MARKER_LEN as i64))).is_err() {
        return false;
    }
    if fd.read_exact(&mut tail).is_err() {
        return false;
    }
    tail == MARKER
}

/// Prepares `fd` for appends when its tail may hold corrupt data: unless
/// the file already ends with a marker, one is appended so the next
/// record starts on a clean boundary.
///
/// Useless on a fresh empty file, never harmful. `fd` must be open with
/// `O_APPEND`; the probe may reposition it.
pub fn append_initial(fd: &File) -> Result<(), StreamError> {
    if ends_with_marker(fd) {
        return Ok(());
    }
    append_to_fd(fd, &MARKER)
}

/// Appends one record with `generation` and `payload` to `fd`.
///
/// `fd` must be open with `O_APPEND`: the kernel then advances the file
/// offset atomically per write, so concurrent appenders never interleave
/// encoded bytes.
pub fn append_buf(fd: &File, generation: u32, payload: &[u8]) -> Result<(), StreamError> {
    let encoded = encode_record(generation, payload)?;
    append_to_fd(fd, &encoded)
}

/// Packs `message` and appends it as one record.
pub fn append_msg<M: PackedMessage>(
    fd: &File,
    generation: u32,
    message: &M,
) -> Result<(), StreamError> {
    let mut scratch = [0u8; MAX_WRITE_LEN];
    let packed = pack_message(message, &mut scratch)?;
    append_buf(fd, generation, packed)
}

/// Writes the initial marker to a buffered stream. No retry: meant for
/// private temporary files where the caller owns flushing and error
/// handling.
pub fn write_initial<W: Write>(stream: &mut W) -> Result<(), StreamError> {
    stream.write_all(&MARKER).map_err(|source| StreamError::Io {
        message: "record stream initial write failed",
        source,
    })
}

/// Writes one record to a buffered stream. Same framing as
/// [`append_buf`], no retry.
pub fn write_buf<W: Write>(
    stream: &mut W,
    generation: u32,
    payload: &[u8],
) -> Result<(), StreamError> {
    let encoded = encode_record(generation, payload)?;
    stream.write_all(&encoded).map_err(|source| StreamError::Io {
        message: "record stream write failed",
        source,
    })
}

/// Packs `message` and writes it as one record to a buffered stream.
pub fn write_msg<W: Write, M: PackedMessage>(
    stream: &mut W,
    generation: u32,
    message: &M,
) -> Result<(), StreamError> {
    let mut scratch = [0u8; MAX_WRITE_LEN];
    let packed = pack_message(message, &mut scratch)?;
    write_buf(stream, generation, packed)
}

fn pack_message<'a, M: PackedMessage>(
    message: &M,
    scratch: &'a mut [u8; MAX_WRITE_LEN],
) -> Result<&'a [u8], StreamError> {
    let size = message.packed_size();
    if size > MAX_WRITE_LEN {
        return Err(StreamError::PayloadTooLarge { len: size });
    }
    let packed = message.pack(&mut scratch[..size]);
    debug_assert!(packed <= size);
    Ok(&scratch[..packed])
}
