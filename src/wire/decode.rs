//! Primitive decoding: bytes → scalars, strings and arrays.

use bytes::Buf;

use super::encode::NULL_LENGTH;
use super::tag::TypeTag;
use crate::error::DataError;
use crate::types::Array;

pub fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), DataError> {
    if buf.remaining() < needed {
        Err(DataError::Protocol(format!(
            "need {needed} bytes but only {} remaining",
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

/// Any non-zero byte reads as `true`.
pub fn decode_bool(buf: &mut impl Buf) -> Result<bool, DataError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

pub fn decode_byte(buf: &mut impl Buf) -> Result<u8, DataError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn decode_short(buf: &mut impl Buf) -> Result<i16, DataError> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_i16())
}

pub fn decode_int(buf: &mut impl Buf) -> Result<i32, DataError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn decode_long(buf: &mut impl Buf) -> Result<i64, DataError> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

pub fn decode_float(buf: &mut impl Buf) -> Result<f32, DataError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_f32())
}

pub fn decode_double(buf: &mut impl Buf) -> Result<f64, DataError> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_f64())
}

pub fn decode_char(buf: &mut impl Buf) -> Result<char, DataError> {
    ensure_remaining(buf, 2)?;
    unit_to_char(buf.get_u16())
}

fn unit_to_char(unit: u16) -> Result<char, DataError> {
    char::from_u32(u32::from(unit))
        .ok_or_else(|| DataError::Protocol(format!("lone surrogate 0x{unit:04X} in char")))
}

/// Validates a length prefix: `-1` yields `None`, other negatives and
/// lengths above `max` are rejected.
pub fn check_len(raw: i32, max: usize, allow_null: bool) -> Result<Option<usize>, DataError> {
    if raw == NULL_LENGTH && allow_null {
        return Ok(None);
    }
    let len = usize::try_from(raw)
        .map_err(|_| DataError::Protocol(format!("negative length {raw}")))?;
    if len > max {
        return Err(DataError::Protocol(format!(
            "length {len} exceeds limit of {max}"
        )));
    }
    Ok(Some(len))
}

pub fn decode_utf8(data: Vec<u8>) -> Result<String, DataError> {
    String::from_utf8(data).map_err(|e| DataError::Protocol(format!("invalid UTF-8 string: {e}")))
}

/// Number of payload bytes used by `count` fixed-size elements.
pub fn packed_size(element: TypeTag, count: usize) -> Result<usize, DataError> {
    if element == TypeTag::Bool {
        return Ok(count.div_ceil(8));
    }
    let size = element
        .fixed_size()
        .filter(|_| element.is_element())
        .ok_or_else(|| DataError::Protocol(format!("{element} elements are not fixed-size")))?;
    size.checked_mul(count).ok_or_else(|| {
        DataError::Protocol(format!("{count} {element} elements overflow the payload size"))
    })
}

/// Reverses [`pack_bools`](super::encode::pack_bools).
pub fn unpack_bools(buf: &mut impl Buf, count: usize) -> Result<Vec<bool>, DataError> {
    ensure_remaining(buf, count.div_ceil(8))?;
    let mut values = Vec::with_capacity(count);
    let mut acc = 0u8;
    for i in 0..count {
        if i % 8 == 0 {
            acc = buf.get_u8();
        }
        values.push(acc & (1 << (i % 8)) != 0);
    }
    Ok(values)
}

/// Decodes `count` fixed-size elements of the given tag.
pub fn decode_fixed_elements(
    buf: &mut impl Buf,
    element: TypeTag,
    count: usize,
) -> Result<Array, DataError> {
    let needed = packed_size(element, count)?;
    ensure_remaining(buf, needed)?;

    Ok(match element {
        TypeTag::Bool => Array::Bool(unpack_bools(buf, count)?),
        TypeTag::Byte => {
            let mut data = vec![0u8; count];
            buf.copy_to_slice(&mut data);
            Array::Byte(data)
        }
        TypeTag::Short => Array::Short((0..count).map(|_| buf.get_i16()).collect()),
        TypeTag::Int => Array::Int((0..count).map(|_| buf.get_i32()).collect()),
        TypeTag::Long => Array::Long((0..count).map(|_| buf.get_i64()).collect()),
        TypeTag::Float => Array::Float((0..count).map(|_| buf.get_f32()).collect()),
        TypeTag::Double => Array::Double((0..count).map(|_| buf.get_f64()).collect()),
        TypeTag::Char => Array::Char(
            (0..count)
                .map(|_| unit_to_char(buf.get_u16()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => {
            return Err(DataError::Protocol(format!(
                "{other} is not a valid array element type"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode;
    use bytes::BytesMut;

    #[test]
    fn scalars_round_trip() {
        let mut buf = BytesMut::new();
        encode::encode_bool(&mut buf, true);
        encode::encode_short(&mut buf, -300);
        encode::encode_int(&mut buf, i32::MIN);
        encode::encode_long(&mut buf, i64::MAX);
        encode::encode_float(&mut buf, f32::NEG_INFINITY);
        encode::encode_double(&mut buf, 2.5);
        encode::encode_char(&mut buf, 0x263A);

        let mut cursor = &buf[..];
        assert!(decode_bool(&mut cursor).unwrap());
        assert_eq!(decode_short(&mut cursor).unwrap(), -300);
        assert_eq!(decode_int(&mut cursor).unwrap(), i32::MIN);
        assert_eq!(decode_long(&mut cursor).unwrap(), i64::MAX);
        assert_eq!(decode_float(&mut cursor).unwrap(), f32::NEG_INFINITY);
        assert_eq!(decode_double(&mut cursor).unwrap(), 2.5);
        assert_eq!(decode_char(&mut cursor).unwrap(), '☺');
        assert!(cursor.is_empty());
    }

    #[test]
    fn nonzero_byte_is_true() {
        let mut cursor = &[0x7F][..];
        assert!(decode_bool(&mut cursor).unwrap());
    }

    #[test]
    fn lone_surrogate_rejected() {
        let mut cursor = &[0xD8, 0x00][..];
        assert!(matches!(decode_char(&mut cursor), Err(DataError::Protocol(_))));
    }

    #[test]
    fn truncated_scalar_rejected() {
        let mut cursor = &[0x00, 0x01][..];
        assert!(decode_int(&mut cursor).is_err());
    }

    #[test]
    fn length_checks() {
        assert_eq!(check_len(5, 10, false).unwrap(), Some(5));
        assert_eq!(check_len(-1, 10, true).unwrap(), None);
        assert!(check_len(-1, 10, false).is_err());
        assert!(check_len(-7, 10, true).is_err());
        assert!(check_len(11, 10, false).is_err());
    }

    #[test]
    fn packed_sizes() {
        assert_eq!(packed_size(TypeTag::Bool, 0).unwrap(), 0);
        assert_eq!(packed_size(TypeTag::Bool, 9).unwrap(), 2);
        assert_eq!(packed_size(TypeTag::Long, 3).unwrap(), 24);
        assert!(packed_size(TypeTag::String, 3).is_err());
        assert!(packed_size(TypeTag::Object, 3).is_err());
    }

    #[test]
    fn packed_size_overflow_is_an_error() {
        let err = packed_size(TypeTag::Long, usize::MAX / 4).unwrap_err();
        assert!(matches!(err, DataError::Protocol(_)));
        assert_eq!(packed_size(TypeTag::Bool, usize::MAX).unwrap(), usize::MAX.div_ceil(8));
    }

    #[test]
    fn unpack_partial_byte() {
        let mut cursor = &[0b0000_0101][..];
        assert_eq!(unpack_bools(&mut cursor, 3).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn fixed_elements_round_trip() {
        for array in [
            Array::Bool(vec![true, false, true, true, false, false, true, false, true]),
            Array::Byte(vec![0, 255, 7]),
            Array::Short(vec![-1, 2]),
            Array::Int(vec![i32::MAX, 0]),
            Array::Long(vec![-9]),
            Array::Float(vec![0.5]),
            Array::Double(vec![1e300, -0.0]),
            Array::Char(vec!['a', 'ß']),
        ] {
            let mut buf = BytesMut::new();
            encode::encode_array(&mut buf, &array).unwrap();
            let mut cursor = &buf[5..];
            let decoded = decode_fixed_elements(&mut cursor, array.element_tag(), array.len());
            assert_eq!(decoded.unwrap(), array);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn string_elements_are_not_fixed() {
        let mut cursor = &[][..];
        assert!(decode_fixed_elements(&mut cursor, TypeTag::String, 0).is_err());
    }
}
