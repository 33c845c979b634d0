//! Type tags: the value kinds the format can carry and their wire ids.

use std::fmt;

use crate::error::DataError;

/// Field id paired with [`TypeTag::EndOfObject`] in the end marker.
pub const END_MARKER_ID: u16 = 0x0F;

/// The single byte that terminates every object body.
pub const END_MARKER: u8 = ((TypeTag::EndOfObject as u8) << 4) | END_MARKER_ID as u8;

/// The kind of value following a field header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Bool = 1,
    Byte = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    Float = 6,
    Double = 7,
    Char = 8,
    String = 9,
    Object = 10,
    Array = 11,
    Null = 12,
    EndOfObject = 13,
}

impl TypeTag {
    /// Maps a wire id back to its tag.
    pub fn from_id(id: u8) -> Result<Self, DataError> {
        Ok(match id {
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Long,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Char,
            9 => Self::String,
            10 => Self::Object,
            11 => Self::Array,
            12 => Self::Null,
            13 => Self::EndOfObject,
            _ => return Err(DataError::Protocol(format!("unknown type tag: {id}"))),
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Payload size in bytes for fixed-size tags, `None` for variable-size ones.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Byte => Some(1),
            Self::Short | Self::Char => Some(2),
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            Self::Null | Self::EndOfObject => Some(0),
            Self::String | Self::Object | Self::Array => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Int | Self::Long | Self::Float | Self::Double
        )
    }

    /// Whether arrays may carry elements of this kind.
    pub fn is_element(self) -> bool {
        !matches!(self, Self::Array | Self::Null | Self::EndOfObject)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
