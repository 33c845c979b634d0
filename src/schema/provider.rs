//! The `SchemaProvider` trait: the host binding that supplies field discovery,
//! instantiation and field access for named types.

use std::borrow::Cow;

use crate::error::DataError;
use crate::types::{FieldType, Value};

/// A declared field of a type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: Cow<'static, str>,
    pub ty: FieldType,
}

impl FieldSpec {
    /// Declares a field with a static name, usable in `const` tables.
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
        }
    }

    pub fn owned(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            ty,
        }
    }
}

/// Object-model binding consumed by the writer and reader.
///
/// Implementations can be generated per type, hand-written, or table driven
/// (see [`SchemaTable`](super::SchemaTable)). Field order returned by
/// [`fields_of`](Self::fields_of) determines the field ids, so it must be
/// stable for a given type name.
pub trait SchemaProvider {
    /// The host's object representation.
    type Object;

    /// Fully qualified type name of an instance.
    fn type_name<'a>(&self, object: &'a Self::Object) -> &'a str;

    /// Declared fields of a type, or `None` if the type is unknown.
    fn fields_of(&self, type_name: &str) -> Option<&[FieldSpec]>;

    /// Creates an empty instance, or `None` if the type is unknown.
    fn instantiate(&self, type_name: &str) -> Option<Self::Object>;

    /// Current value of a field; `None` means absent.
    fn get_field(&self, object: &Self::Object, field: &str) -> Option<Value<Self::Object>>;

    /// Stores a decoded value (or absence) into a field.
    ///
    /// Returning [`DataError::SchemaMismatch`] makes the reader skip the
    /// value and continue; any other error aborts decoding.
    fn set_field(
        &self,
        object: &mut Self::Object,
        field: &str,
        value: Option<Value<Self::Object>>,
    ) -> Result<(), DataError>;
}
