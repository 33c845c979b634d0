//! Primitive encoding: scalars, strings and arrays → bytes.
//!
//! All multi-byte values are big-endian.

use bytes::{BufMut, BytesMut};

use super::tag::TypeTag;
use crate::error::DataError;
use crate::types::Array;

/// Length prefix marking a null element inside a string array.
pub const NULL_LENGTH: i32 = -1;

pub fn encode_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub fn encode_byte(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

pub fn encode_short(buf: &mut BytesMut, value: i16) {
    buf.put_i16(value);
}

pub fn encode_int(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn encode_long(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn encode_float(buf: &mut BytesMut, value: f32) {
    buf.put_f32(value);
}

pub fn encode_double(buf: &mut BytesMut, value: f64) {
    buf.put_f64(value);
}

/// Returns the UTF-16 code unit for `c`, or `None` outside the BMP.
pub fn char_unit(c: char) -> Option<u16> {
    u16::try_from(u32::from(c)).ok()
}

/// Encodes a char as one UTF-16 code unit.
pub fn encode_char(buf: &mut BytesMut, unit: u16) {
    buf.put_u16(unit);
}

/// Encodes an `Int32` length prefix.
pub fn encode_len(buf: &mut BytesMut, len: usize) -> Result<(), DataError> {
    let len = i32::try_from(len)
        .map_err(|_| DataError::Protocol(format!("length {len} exceeds Int32 range")))?;
    buf.put_i32(len);
    Ok(())
}

/// Encodes a string (length = byte length, not char count).
pub fn encode_string(buf: &mut BytesMut, value: &str) -> Result<(), DataError> {
    encode_len(buf, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Packs booleans 8 per byte, element `i` at bit `i % 8` of byte `i / 8`.
pub fn pack_bools(buf: &mut BytesMut, values: &[bool]) {
    for chunk in values.chunks(8) {
        let mut acc = 0u8;
        for (bit, &value) in chunk.iter().enumerate() {
            if value {
                acc |= 1 << bit;
            }
        }
        buf.put_u8(acc);
    }
}

/// Encodes an array payload: element tag, `Int32` count, packed elements.
pub fn encode_array(buf: &mut BytesMut, array: &Array) -> Result<(), DataError> {
    encode_array_prefix(buf, array.element_tag(), array.len())?;
    match array {
        Array::Bool(v) => pack_bools(buf, v),
        Array::Byte(v) => buf.put_slice(v),
        Array::Short(v) => v.iter().for_each(|&x| buf.put_i16(x)),
        Array::Int(v) => v.iter().for_each(|&x| buf.put_i32(x)),
        Array::Long(v) => v.iter().for_each(|&x| buf.put_i64(x)),
        Array::Float(v) => v.iter().for_each(|&x| buf.put_f32(x)),
        Array::Double(v) => v.iter().for_each(|&x| buf.put_f64(x)),
        Array::Char(v) => {
            for &c in v {
                let unit = char_unit(c).ok_or_else(|| {
                    DataError::Protocol(format!("char {c:?} is outside the BMP"))
                })?;
                buf.put_u16(unit);
            }
        }
        Array::String(v) => {
            for item in v {
                match item {
                    Some(s) => encode_string(buf, s)?,
                    None => buf.put_i32(NULL_LENGTH),
                }
            }
        }
    }
    Ok(())
}

/// Encodes the element tag and count that open every array payload.
pub fn encode_array_prefix(
    buf: &mut BytesMut,
    element: TypeTag,
    count: usize,
) -> Result<(), DataError> {
    if !element.is_element() {
        return Err(DataError::Protocol(format!(
            "{element} is not a valid array element type"
        )));
    }
    buf.put_u8(element.id());
    encode_len(buf, count)
}
