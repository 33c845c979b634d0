//! Field header codec: the `(tag, id)` pair preceding every value.
//!
//! Ids `1..=14` fit the low nibble of a single byte. Larger ids use a
//! three-byte form whose low nibble is `0`, followed by the id as a big-endian
//! `u16`. The low nibble `15` is reserved for the end-of-object marker.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use super::tag::{END_MARKER, END_MARKER_ID, TypeTag};
use crate::error::DataError;

/// Largest id that fits the compact one-byte form.
pub const MAX_COMPACT_ID: u16 = 14;

/// A decoded field header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHeader {
    pub tag: TypeTag,
    pub id: u16,
}

impl FieldHeader {
    pub const END: FieldHeader = FieldHeader {
        tag: TypeTag::EndOfObject,
        id: END_MARKER_ID,
    };

    pub fn new(tag: TypeTag, id: u16) -> Self {
        Self { tag, id }
    }

    pub fn is_end(&self) -> bool {
        self.tag == TypeTag::EndOfObject
    }
}

impl fmt::Display for FieldHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tag, self.id)
    }
}

/// Outcome of decoding the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStart {
    Complete(FieldHeader),
    /// The id follows in two more bytes.
    Extended(TypeTag),
}

/// Encodes a field header. `EndOfObject` is written with [`encode_end`].
pub fn encode_header(buf: &mut BytesMut, tag: TypeTag, id: u32) -> Result<(), DataError> {
    if tag == TypeTag::EndOfObject {
        return Err(DataError::protocol(
            "end-of-object marker cannot carry an application field id",
        ));
    }
    if id == 0 || id > u32::from(u16::MAX) {
        return Err(DataError::Protocol(format!(
            "field id {id} out of range 1..=65535"
        )));
    }
    let high = tag.id() << 4;
    if id <= u32::from(MAX_COMPACT_ID) {
        buf.put_u8(high | id as u8);
    } else {
        buf.put_u8(high);
        buf.put_u16(id as u16);
    }
    Ok(())
}

/// Encodes the end-of-object marker.
pub fn encode_end(buf: &mut BytesMut) {
    buf.put_u8(END_MARKER);
}

/// Interprets the first byte of a header.
pub fn decode_start(byte: u8) -> Result<HeaderStart, DataError> {
    let tag = TypeTag::from_id(byte >> 4)?;
    let low = u16::from(byte & 0x0F);

    match (tag, low) {
        (TypeTag::EndOfObject, END_MARKER_ID) => Ok(HeaderStart::Complete(FieldHeader::END)),
        (TypeTag::EndOfObject, other) => Err(DataError::Protocol(format!(
            "corrupt end-of-object marker: id {other}"
        ))),
        (_, END_MARKER_ID) => Err(DataError::Protocol(format!(
            "id {END_MARKER_ID} is reserved for the end marker, got tag {tag}"
        ))),
        (_, 0) => Ok(HeaderStart::Extended(tag)),
        (_, id) => Ok(HeaderStart::Complete(FieldHeader { tag, id })),
    }
}

/// Completes an extended header from its two trailing id bytes.
pub fn decode_extended(tag: TypeTag, id: u16) -> Result<FieldHeader, DataError> {
    if id == 0 {
        return Err(DataError::protocol("field id 0 in extended header"));
    }
    Ok(FieldHeader { tag, id })
}

/// Decodes a complete header from an in-memory buffer.
pub fn decode_header(buf: &mut impl Buf) -> Result<FieldHeader, DataError> {
    if !buf.has_remaining() {
        return Err(DataError::protocol("unexpected end of data"));
    }
    match decode_start(buf.get_u8())? {
        HeaderStart::Complete(header) => Ok(header),
        HeaderStart::Extended(tag) => {
            if buf.remaining() < 2 {
                return Err(DataError::protocol("unexpected end of data"));
            }
            decode_extended(tag, buf.get_u16())
        }
    }
}
