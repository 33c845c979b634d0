//! Class and field descriptors.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::provider::FieldSpec;
use crate::error::DataError;
use crate::types::FieldType;

/// A field as known to one stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: u16,
    pub name: String,
    /// `None` when the local schema has no field of this name. Such fields
    /// are always skipped on read.
    pub ty: Option<FieldType>,
}

impl FieldDescriptor {
    pub fn is_bound(&self) -> bool {
        self.ty.is_some()
    }
}

/// Per-type metadata, sent at most once per stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    /// Stream-local id; not stable across sessions.
    pub class_id: u32,
    pub fields: BTreeMap<u16, FieldDescriptor>,
}

impl ClassDescriptor {
    /// Assigns field ids in declaration order, starting at `base`.
    pub fn from_specs(
        name: &str,
        class_id: u32,
        base: u16,
        specs: &[FieldSpec],
    ) -> Result<Self, DataError> {
        let mut fields = BTreeMap::new();
        let mut names = HashSet::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            if !spec.ty.is_valid() {
                return Err(DataError::mismatch(
                    name,
                    &*spec.name,
                    format!("invalid declared type {}", spec.ty),
                ));
            }
            if !names.insert(&*spec.name) {
                return Err(DataError::mismatch(name, &*spec.name, "declared twice"));
            }
            let id = u16::try_from(index)
                .ok()
                .and_then(|i| base.checked_add(i))
                .ok_or_else(|| {
                    DataError::Protocol(format!(
                        "{name} declares too many fields for base id {base}"
                    ))
                })?;
            fields.insert(
                id,
                FieldDescriptor {
                    id,
                    name: spec.name.to_string(),
                    ty: Some(spec.ty),
                },
            );
        }

        Ok(Self {
            name: name.to_owned(),
            class_id,
            fields,
        })
    }

    /// Builds a name-only descriptor from transmitted `(id, name)` pairs.
    pub fn transmitted(name: String, class_id: u32, fields: BTreeMap<u16, String>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(id, name)| (id, FieldDescriptor { id, name, ty: None }))
            .collect();
        Self {
            name,
            class_id,
            fields,
        }
    }

    /// Merges a transmitted descriptor with the local declaration of the same
    /// type. Fields the local schema does not declare stay unbound.
    pub fn bind(&self, local: Option<&[FieldSpec]>) -> Self {
        let local: HashMap<&str, FieldType> = local
            .unwrap_or_default()
            .iter()
            .map(|spec| (&*spec.name, spec.ty))
            .collect();

        let fields = self
            .fields
            .iter()
            .map(|(&id, field)| {
                let ty = local.get(field.name.as_str()).copied();
                (
                    id,
                    FieldDescriptor {
                        id,
                        name: field.name.clone(),
                        ty,
                    },
                )
            })
            .collect();

        Self {
            name: self.name.clone(),
            class_id: self.class_id,
            fields,
        }
    }

    pub fn field(&self, id: u16) -> Option<&FieldDescriptor> {
        self.fields.get(&id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.values().find(|f| f.name == name)
    }
}
