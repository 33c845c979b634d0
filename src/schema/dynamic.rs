//! Table-driven schema provider over name-keyed records.

use std::collections::{BTreeMap, HashMap};

use super::provider::{FieldSpec, SchemaProvider};
use crate::error::DataError;
use crate::types::Value;

/// Value type of [`DynamicObject`] fields.
pub type DynamicValue = Value<DynamicObject>;

/// A record of named field values tagged with its type name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamicObject {
    type_name: String,
    fields: BTreeMap<String, DynamicValue>,
}

impl DynamicObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<DynamicValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&DynamicValue> {
        self.fields.get(field)
    }

    /// Sets or clears a field.
    pub fn set(&mut self, field: impl Into<String>, value: Option<DynamicValue>) {
        let field = field.into();
        match value {
            Some(value) => {
                self.fields.insert(field, value);
            }
            None => {
                self.fields.remove(&field);
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<DynamicObject> for DynamicValue {
    fn from(o: DynamicObject) -> Self {
        Self::Object(Box::new(o))
    }
}

/// Hand-authored field tables, one per type name.
///
/// ```
/// use dataio::schema::{FieldSpec, SchemaTable};
/// use dataio::types::FieldType;
///
/// let schema = SchemaTable::new().with_type(
///     "geo.Point",
///     [FieldSpec::new("x", FieldType::INT), FieldSpec::new("y", FieldType::INT)],
/// );
/// assert!(schema.contains("geo.Point"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    types: HashMap<String, Vec<FieldSpec>>,
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(
        mut self,
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Self {
        self.register(type_name, fields);
        self
    }

    /// Adds or replaces the declaration of a type.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) {
        self.types
            .insert(type_name.into(), fields.into_iter().collect());
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    fn spec(&self, type_name: &str, field: &str) -> Option<&FieldSpec> {
        self.types
            .get(type_name)?
            .iter()
            .find(|spec| spec.name == field)
    }
}

impl SchemaProvider for SchemaTable {
    type Object = DynamicObject;

    fn type_name<'a>(&self, object: &'a DynamicObject) -> &'a str {
        &object.type_name
    }

    fn fields_of(&self, type_name: &str) -> Option<&[FieldSpec]> {
        self.types.get(type_name).map(Vec::as_slice)
    }

    fn instantiate(&self, type_name: &str) -> Option<DynamicObject> {
        self.contains(type_name).then(|| DynamicObject::new(type_name))
    }

    fn get_field(&self, object: &DynamicObject, field: &str) -> Option<DynamicValue> {
        object.fields.get(field).cloned()
    }

    fn set_field(
        &self,
        object: &mut DynamicObject,
        field: &str,
        value: Option<DynamicValue>,
    ) -> Result<(), DataError> {
        let spec = self
            .spec(&object.type_name, field)
            .ok_or_else(|| DataError::mismatch(&object.type_name, field, "no such field"))?;
        if let Some(value) = &value {
            let actual = value.field_type();
            if actual != spec.ty {
                return Err(DataError::mismatch(
                    &object.type_name,
                    field,
                    format!("expected {}, got {actual}", spec.ty),
                ));
            }
        }
        object.set(field, value);
        Ok(())
    }
}
