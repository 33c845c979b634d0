//! Per-session class registries.
//!
//! A registry lives exactly as long as its root writer or reader session and
//! is shared by every child stream of that session. Class ids it hands out are
//! only meaningful inside that one session.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use super::descriptor::ClassDescriptor;
use super::names::{NameCompressor, NameDecompressor};
use super::provider::SchemaProvider;
use crate::config::CLASS_META_FIELD;
use crate::error::DataError;
use crate::stream::Writer;

/// Field ids inside a class-metadata block.
pub(crate) mod meta {
    pub const NAME: u16 = 1;
    pub const CLASS_ID: u16 = 2;
    pub const FIELDS: u16 = 3;
}

/// Write-side registry: type name → descriptor.
#[derive(Debug)]
pub struct WriteRegistry {
    by_name: HashMap<String, Arc<ClassDescriptor>>,
    names: NameCompressor,
    next_id: u32,
}

impl WriteRegistry {
    pub fn new(compress_names: bool) -> Self {
        Self {
            by_name: HashMap::new(),
            names: NameCompressor::new(compress_names),
            next_id: 1,
        }
    }

    /// Looks up or derives the descriptor of `type_name`.
    ///
    /// The flag is `true` the first time the type is seen in this session,
    /// telling the writer to emit the descriptor.
    pub fn register_for_write<P: SchemaProvider + ?Sized>(
        &mut self,
        provider: &P,
        type_name: &str,
        base_field_id: u16,
    ) -> Result<(Arc<ClassDescriptor>, bool), DataError> {
        if let Some(desc) = self.by_name.get(type_name) {
            return Ok((Arc::clone(desc), false));
        }

        let specs = provider
            .fields_of(type_name)
            .ok_or_else(|| DataError::UnknownType(type_name.to_owned()))?;
        let class_id = self.next_id;
        if i32::try_from(class_id).is_err() {
            return Err(DataError::protocol("class id space exhausted"));
        }
        let desc = Arc::new(ClassDescriptor::from_specs(
            type_name,
            class_id,
            base_field_id,
            specs,
        )?);
        self.next_id += 1;

        tracing::debug!(
            type_name,
            class_id,
            fields = desc.fields.len(),
            "registered class for write"
        );
        self.by_name.insert(type_name.to_owned(), Arc::clone(&desc));
        Ok((desc, true))
    }

    /// Drops a type whose descriptor never reached the wire, so the next
    /// write of that type sends it again. Its class id is not reused.
    pub(crate) fn forget(&mut self, type_name: &str) {
        self.by_name.remove(type_name);
    }

    /// Compresses a name against the names already sent in this session.
    pub fn compress_name(&mut self, name: &str) -> Vec<u8> {
        self.names.compress(name)
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.by_name.get(type_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Writes a class-metadata block under field id 1 of an encoded object:
/// `{1: compressed name, 2: class id, 3: {field id: field name, ...}}`.
///
/// Field types are not sent; the reading side re-derives them by name.
pub fn write_descriptor<W: Write>(
    writer: &mut Writer<'_, W>,
    compressed_name: &[u8],
    desc: &ClassDescriptor,
) -> Result<(), DataError> {
    let class_id = i32::try_from(desc.class_id)
        .map_err(|_| DataError::Protocol(format!("class id {} out of range", desc.class_id)))?;

    let mut block = writer.start_object(CLASS_META_FIELD)?;
    block.write_bytes(meta::NAME, Some(compressed_name))?;
    block.write_int(meta::CLASS_ID, class_id)?;

    let mut fields = block.start_object(meta::FIELDS)?;
    for field in desc.fields.values() {
        fields.write_string(field.id, Some(field.name.as_str()))?;
    }
    fields.finish()?;
    block.finish()
}

/// Read-side registry: class id → transmitted descriptor, plus the
/// descriptors bound against the local schema.
#[derive(Debug, Default)]
pub struct ReadRegistry {
    transmitted: HashMap<u32, Arc<ClassDescriptor>>,
    bound: HashMap<u32, Arc<ClassDescriptor>>,
    names: NameDecompressor,
}

impl ReadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received descriptor block.
    pub fn absorb(
        &mut self,
        compressed_name: &[u8],
        class_id: u32,
        fields: BTreeMap<u16, String>,
    ) -> Result<Arc<ClassDescriptor>, DataError> {
        let name = self.names.decompress(compressed_name)?;
        tracing::debug!(
            type_name = %name,
            class_id,
            fields = fields.len(),
            "received class descriptor"
        );
        let desc = Arc::new(ClassDescriptor::transmitted(name, class_id, fields));
        self.bound.remove(&class_id);
        self.transmitted.insert(class_id, Arc::clone(&desc));
        Ok(desc)
    }

    /// The descriptor a received block describes, without recording it.
    pub fn preview(
        &self,
        compressed_name: &[u8],
        class_id: u32,
        fields: &BTreeMap<u16, String>,
    ) -> Result<ClassDescriptor, DataError> {
        let name = self.names.resolve(compressed_name)?;
        Ok(ClassDescriptor::transmitted(name, class_id, fields.clone()))
    }

    /// The transmitted descriptor for a class id, merged with the provider's
    /// declaration of the same type name.
    pub fn bind<P: SchemaProvider + ?Sized>(
        &mut self,
        class_id: u32,
        provider: &P,
    ) -> Result<Arc<ClassDescriptor>, DataError> {
        if let Some(desc) = self.bound.get(&class_id) {
            return Ok(Arc::clone(desc));
        }
        let transmitted = self.transmitted.get(&class_id).ok_or_else(|| {
            DataError::Protocol(format!("class id {class_id} used before its descriptor"))
        })?;
        let desc = Arc::new(transmitted.bind(provider.fields_of(&transmitted.name)));
        self.bound.insert(class_id, Arc::clone(&desc));
        Ok(desc)
    }

    pub fn get(&self, class_id: u32) -> Option<&Arc<ClassDescriptor>> {
        self.transmitted.get(&class_id)
    }

    pub fn len(&self) -> usize {
        self.transmitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transmitted.is_empty()
    }
}
