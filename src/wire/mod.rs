//! data-io wire format.
//!
//! Every value is preceded by a field header carrying its [`TypeTag`] and
//! field id. Objects are open-ended field sequences closed by an end marker.
//! All multi-byte quantities are big-endian.

pub mod decode;
pub mod encode;
pub mod header;
pub mod tag;

pub use header::{FieldHeader, decode_header, encode_end, encode_header};
pub use tag::{END_MARKER, END_MARKER_ID, TypeTag};
