//! Record stream layer: framed, CRC-validated records over the
//! word-stuff codec, appended to a file and read back through a
//! marker-scanning iterator.

pub mod append;
pub mod iter;
pub mod msg;
pub mod record;

pub use append::{append_buf, append_initial, append_msg, write_buf, write_initial, write_msg};
pub use iter::{RecordStreamIter, StreamRecord};
pub use msg::{PackedMessage, UnpackMessage};
pub use record::{StreamError, MAX_READ_LEN, MAX_WRITE_LEN, RECORD_HEADER_LEN};
