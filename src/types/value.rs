//! Values carried by data-io fields.

use std::fmt;

use crate::wire::TypeTag;

/// A homogeneous array of scalars or strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Bool(Vec<bool>),
    Byte(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<char>),
    /// `None` elements are encoded with length `-1`.
    String(Vec<Option<String>>),
}

impl Array {
    pub fn element_tag(&self) -> TypeTag {
        match self {
            Self::Bool(_) => TypeTag::Bool,
            Self::Byte(_) => TypeTag::Byte,
            Self::Short(_) => TypeTag::Short,
            Self::Int(_) => TypeTag::Int,
            Self::Long(_) => TypeTag::Long,
            Self::Float(_) => TypeTag::Float,
            Self::Double(_) => TypeTag::Double,
            Self::Char(_) => TypeTag::Char,
            Self::String(_) => TypeTag::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A present field value. Absence (`null`) is modelled with `Option<Value<O>>`.
///
/// `O` is the host's object type, as chosen by its
/// [`SchemaProvider`](crate::schema::SchemaProvider).
#[derive(Debug, Clone, PartialEq)]
pub enum Value<O> {
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Restricted to the Basic Multilingual Plane on the wire.
    Char(char),
    String(String),
    Array(Array),
    /// Array whose elements are nested objects.
    Objects(Vec<Option<O>>),
    Object(Box<O>),
}

impl<O> Value<O> {
    /// The wire tag this value is written with.
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Bool(_) => TypeTag::Bool,
            Self::Byte(_) => TypeTag::Byte,
            Self::Short(_) => TypeTag::Short,
            Self::Int(_) => TypeTag::Int,
            Self::Long(_) => TypeTag::Long,
            Self::Float(_) => TypeTag::Float,
            Self::Double(_) => TypeTag::Double,
            Self::Char(_) => TypeTag::Char,
            Self::String(_) => TypeTag::String,
            Self::Array(_) | Self::Objects(_) => TypeTag::Array,
            Self::Object(_) => TypeTag::Object,
        }
    }

    /// The field type a destination needs in order to hold this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Array(a) => FieldType::array(a.element_tag()),
            Self::Objects(_) => FieldType::array(TypeTag::Object),
            other => FieldType::scalar(other.tag()),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&O> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

/// Declared type of a field: its tag, plus the element tag for arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub tag: TypeTag,
    pub element: Option<TypeTag>,
}

impl FieldType {
    pub const BOOL: FieldType = FieldType::scalar(TypeTag::Bool);
    pub const BYTE: FieldType = FieldType::scalar(TypeTag::Byte);
    pub const SHORT: FieldType = FieldType::scalar(TypeTag::Short);
    pub const INT: FieldType = FieldType::scalar(TypeTag::Int);
    pub const LONG: FieldType = FieldType::scalar(TypeTag::Long);
    pub const FLOAT: FieldType = FieldType::scalar(TypeTag::Float);
    pub const DOUBLE: FieldType = FieldType::scalar(TypeTag::Double);
    pub const CHAR: FieldType = FieldType::scalar(TypeTag::Char);
    pub const STRING: FieldType = FieldType::scalar(TypeTag::String);
    pub const OBJECT: FieldType = FieldType::scalar(TypeTag::Object);

    pub const fn scalar(tag: TypeTag) -> Self {
        Self { tag, element: None }
    }

    pub const fn array(element: TypeTag) -> Self {
        Self {
            tag: TypeTag::Array,
            element: Some(element),
        }
    }

    /// Whether a wire value tagged `tag` (with `element` for arrays) can be
    /// stored in a field of this type.
    pub fn accepts(&self, tag: TypeTag, element: Option<TypeTag>) -> bool {
        self.tag == tag && (tag != TypeTag::Array || self.element == element)
    }

    /// Whether the declaration itself is well-formed.
    pub fn is_valid(&self) -> bool {
        match (self.tag, self.element) {
            (TypeTag::Array, Some(element)) => element.is_element(),
            (TypeTag::Array, None) | (TypeTag::Null | TypeTag::EndOfObject, _) => false,
            (_, element) => element.is_none(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element {
            Some(element) => write!(f, "{element}[]"),
            None => write!(f, "{}", self.tag),
        }
    }
}

// -- Convenience conversions --

impl<O> From<bool> for Value<O> {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<O> From<u8> for Value<O> {
    fn from(b: u8) -> Self {
        Self::Byte(b)
    }
}

impl<O> From<i16> for Value<O> {
    fn from(i: i16) -> Self {
        Self::Short(i)
    }
}

impl<O> From<i32> for Value<O> {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl<O> From<i64> for Value<O> {
    fn from(i: i64) -> Self {
        Self::Long(i)
    }
}

impl<O> From<f32> for Value<O> {
    fn from(f: f32) -> Self {
        Self::Float(f)
    }
}

impl<O> From<f64> for Value<O> {
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl<O> From<char> for Value<O> {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}

impl<O> From<String> for Value<O> {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<O> From<&str> for Value<O> {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl<O> From<Array> for Value<O> {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Debug>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item:?}")?;
            }
            write!(f, "]")
        }
        match self {
            Self::Bool(v) => list(f, v),
            Self::Byte(v) => list(f, v),
            Self::Short(v) => list(f, v),
            Self::Int(v) => list(f, v),
            Self::Long(v) => list(f, v),
            Self::Float(v) => list(f, v),
            Self::Double(v) => list(f, v),
            Self::Char(v) => list(f, v),
            Self::String(v) => list(f, v),
        }
    }
}

impl<O> fmt::Display for Value<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Byte(b) => write!(f, "{b}"),
            Self::Short(i) => write!(f, "{i}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Array(a) => write!(f, "{a}"),
            Self::Objects(items) => write!(f, "<{} objects>", items.len()),
            Self::Object(_) => write!(f, "<object>"),
        }
    }
}
