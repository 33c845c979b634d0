//! Sequential encoder.
//!
//! A [`WriteSession`] owns the sink, the class registry and the encode buffer.
//! [`Writer`] handles borrow it: the root handle comes from
//! [`WriteSession::writer`], nested handles from [`Writer::start_object`].
//! Because a child borrows its parent mutably, only the most recently opened
//! child can be used. A child that is dropped without [`Writer::finish`] is
//! finished automatically before the parent's next operation.

use std::io::Write;

use bytes::BytesMut;

use crate::config::{CLASS_ID_FIELD, Config};
use crate::error::DataError;
use crate::schema::{ClassDescriptor, SchemaProvider};
use crate::schema::registry::{WriteRegistry, write_descriptor};
use crate::types::{Array, Value};
use crate::wire::{TypeTag, encode, encode_end, encode_header};

/// Shared state of one write session.
pub(crate) struct WriteState<W> {
    sink: W,
    buf: BytesMut,
    /// Number of open levels; the root is level 1.
    depth: usize,
    poisoned: bool,
    registry: WriteRegistry,
    config: Config,
}

impl<W: Write> WriteState<W> {
    fn flush_buf(&mut self) -> Result<(), DataError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.sink.write_all(&self.buf);
        self.buf.clear();
        result.map_err(|e| self.fail(e.into()))
    }

    fn maybe_flush(&mut self) -> Result<(), DataError> {
        if self.buf.len() >= self.config.flush_threshold {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn fail(&mut self, e: DataError) -> DataError {
        if matches!(e, DataError::Io(_)) {
            self.poisoned = true;
        }
        e
    }
}

/// The root of a write session.
///
/// ```
/// use dataio::WriteSession;
///
/// let mut session = WriteSession::new(Vec::new());
/// let mut root = session.writer();
/// root.write_int(3, 42)?;
/// root.write_string(4, Some("hello"))?;
/// root.finish()?;
/// let bytes = session.into_inner()?;
/// assert_eq!(bytes.last(), Some(&0xDF));
/// # Ok::<(), dataio::DataError>(())
/// ```
pub struct WriteSession<W> {
    state: WriteState<W>,
}

impl<W: Write> WriteSession<W> {
    pub fn new(sink: W) -> Self {
        Self::build(sink, Config::default())
    }

    pub fn with_config(sink: W, config: Config) -> Result<Self, DataError> {
        config.validate()?;
        Ok(Self::build(sink, config))
    }

    fn build(sink: W, config: Config) -> Self {
        Self {
            state: WriteState {
                sink,
                buf: BytesMut::with_capacity(config.flush_threshold.min(64 * 1024)),
                depth: 1,
                poisoned: false,
                registry: WriteRegistry::new(config.compress_names),
                config,
            },
        }
    }

    /// Handle on the root field sequence.
    pub fn writer(&mut self) -> Writer<'_, W> {
        Writer {
            state: &mut self.state,
            level: 1,
        }
    }

    /// Whether the root stream has been finished.
    pub fn is_finished(&self) -> bool {
        self.state.depth == 0
    }

    pub fn registry(&self) -> &WriteRegistry {
        &self.state.registry
    }

    /// Returns the sink once the root stream is finished.
    pub fn into_inner(mut self) -> Result<W, DataError> {
        if !self.is_finished() {
            return Err(DataError::protocol("root stream was never finished"));
        }
        self.state.flush_buf()?;
        Ok(self.state.sink)
    }
}

/// A handle writing the fields of one level: the root stream or one nested
/// object.
pub struct Writer<'s, W> {
    state: &'s mut WriteState<W>,
    level: usize,
}

impl<'s, W: Write> Writer<'s, W> {
    /// Nesting level of this handle; the root is 1.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Checks the stream is usable and finishes any open child.
    fn begin(&mut self) -> Result<(), DataError> {
        if self.state.poisoned {
            return Err(DataError::protocol("stream is in a failed state"));
        }
        if self.state.depth < self.level {
            return Err(DataError::protocol("stream already closed"));
        }
        while self.state.depth > self.level {
            tracing::debug!(
                level = self.state.depth,
                "auto-finishing unfinished child object"
            );
            encode_end(&mut self.state.buf);
            self.state.depth -= 1;
        }
        Ok(())
    }

    /// Encodes one field. A field rejected by `f` leaves no bytes behind.
    fn field<F>(&mut self, id: u16, tag: TypeTag, f: F) -> Result<(), DataError>
    where
        F: FnOnce(&mut BytesMut) -> Result<(), DataError>,
    {
        self.begin()?;
        let buf = &mut self.state.buf;
        let mark = buf.len();
        let result = encode_header(buf, tag, u32::from(id)).and_then(|()| f(buf));
        if let Err(e) = result {
            buf.truncate(mark);
            return Err(e);
        }
        self.state.maybe_flush()
    }

    pub fn write_bool(&mut self, id: u16, value: bool) -> Result<(), DataError> {
        self.field(id, TypeTag::Bool, |buf| {
            encode::encode_bool(buf, value);
            Ok(())
        })
    }

    pub fn write_byte(&mut self, id: u16, value: u8) -> Result<(), DataError> {
        self.field(id, TypeTag::Byte, |buf| {
            encode::encode_byte(buf, value);
            Ok(())
        })
    }

    pub fn write_short(&mut self, id: u16, value: i16) -> Result<(), DataError> {
        self.field(id, TypeTag::Short, |buf| {
            encode::encode_short(buf, value);
            Ok(())
        })
    }

    pub fn write_int(&mut self, id: u16, value: i32) -> Result<(), DataError> {
        self.field(id, TypeTag::Int, |buf| {
            encode::encode_int(buf, value);
            Ok(())
        })
    }

    pub fn write_long(&mut self, id: u16, value: i64) -> Result<(), DataError> {
        self.field(id, TypeTag::Long, |buf| {
            encode::encode_long(buf, value);
            Ok(())
        })
    }

    pub fn write_float(&mut self, id: u16, value: f32) -> Result<(), DataError> {
        self.field(id, TypeTag::Float, |buf| {
            encode::encode_float(buf, value);
            Ok(())
        })
    }

    pub fn write_double(&mut self, id: u16, value: f64) -> Result<(), DataError> {
        self.field(id, TypeTag::Double, |buf| {
            encode::encode_double(buf, value);
            Ok(())
        })
    }

    /// Writes a char. Only Basic Multilingual Plane chars are representable.
    pub fn write_char(&mut self, id: u16, value: char) -> Result<(), DataError> {
        let unit = encode::char_unit(value)
            .ok_or_else(|| DataError::Protocol(format!("char {value:?} is outside the BMP")))?;
        self.field(id, TypeTag::Char, |buf| {
            encode::encode_char(buf, unit);
            Ok(())
        })
    }

    pub fn write_null(&mut self, id: u16) -> Result<(), DataError> {
        self.field(id, TypeTag::Null, |_| Ok(()))
    }

    /// Writes a string; `None` is written as `Null`.
    pub fn write_string(&mut self, id: u16, value: Option<&str>) -> Result<(), DataError> {
        match value {
            Some(s) => self.field(id, TypeTag::String, |buf| encode::encode_string(buf, s)),
            None => self.write_null(id),
        }
    }

    /// Writes a scalar or string array; `None` is written as `Null`.
    pub fn write_array(&mut self, id: u16, value: Option<&Array>) -> Result<(), DataError> {
        match value {
            Some(array) => self.field(id, TypeTag::Array, |buf| encode::encode_array(buf, array)),
            None => self.write_null(id),
        }
    }

    /// Writes a byte array without copying it into an [`Array`].
    pub fn write_bytes(&mut self, id: u16, value: Option<&[u8]>) -> Result<(), DataError> {
        match value {
            Some(bytes) => self.field(id, TypeTag::Array, |buf| {
                encode::encode_array_prefix(buf, TypeTag::Byte, bytes.len())?;
                buf.extend_from_slice(bytes);
                Ok(())
            }),
            None => self.write_null(id),
        }
    }

    fn open_child(&mut self) -> Result<Writer<'_, W>, DataError> {
        let level = self.level + 1;
        self.state.depth = level;
        Ok(Writer {
            state: &mut *self.state,
            level,
        })
    }

    fn check_depth(&self) -> Result<(), DataError> {
        if self.level >= self.state.config.max_depth {
            return Err(DataError::Protocol(format!(
                "nesting deeper than {} levels",
                self.state.config.max_depth
            )));
        }
        Ok(())
    }

    /// Opens a nested object under `id`.
    ///
    /// Any child previously opened from this writer is finished first. The
    /// returned child must be finished, either explicitly or by the next
    /// operation on this writer.
    ///
    /// Readers take an `Object#1` field immediately followed by `Int#2` as
    /// class metadata, so plain objects should not use that pair.
    pub fn start_object(&mut self, id: u16) -> Result<Writer<'_, W>, DataError> {
        self.check_depth()?;
        self.field(id, TypeTag::Object, |_| Ok(()))?;
        self.open_child()
    }

    /// Opens an array of `count` objects under `id`.
    ///
    /// Each element is written into the returned child under field id 1,
    /// either as an object or as `Null`.
    pub fn start_object_array(
        &mut self,
        id: u16,
        count: usize,
    ) -> Result<Writer<'_, W>, DataError> {
        self.check_depth()?;
        self.field(id, TypeTag::Array, |buf| {
            encode::encode_array_prefix(buf, TypeTag::Object, count)
        })?;
        self.open_child()
    }

    /// Encodes an object through the schema provider.
    ///
    /// The class descriptor is emitted under field id 1 the first time the
    /// type appears in this session, followed by the class id under field
    /// id 2 and one field per declared field. Absent values are written as
    /// `Null` when `write_null_fields` is set and omitted otherwise.
    pub fn write_object<P>(
        &mut self,
        id: u16,
        provider: &P,
        object: Option<&P::Object>,
        write_null_fields: bool,
    ) -> Result<(), DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        let Some(object) = object else {
            return self.write_null(id);
        };
        self.begin()?;

        let type_name = provider.type_name(object);
        let base = self.state.config.base_field_id;
        let (desc, is_new) = self
            .state
            .registry
            .register_for_write(provider, type_name, base)?;

        // Collect first so a mismatching field fails before any byte is written.
        let mut values = Vec::with_capacity(desc.fields.len());
        for field in desc.fields.values() {
            let Some(ty) = field.ty else { continue };
            match provider.get_field(object, &field.name) {
                Some(value) => {
                    let actual = value.field_type();
                    if actual != ty {
                        if is_new {
                            self.state.registry.forget(type_name);
                        }
                        return Err(DataError::mismatch(
                            &desc.name,
                            &field.name,
                            format!("declared {ty}, value is {actual}"),
                        ));
                    }
                    values.push((field.id, Some(value)));
                }
                None if write_null_fields => values.push((field.id, None)),
                None => {}
            }
        }
        let class_id = i32::try_from(desc.class_id)
            .map_err(|_| DataError::Protocol(format!("class id {} out of range", desc.class_id)))?;
        let mut child = match self.start_object(id) {
            Ok(child) => child,
            Err(e) => {
                if is_new {
                    self.state.registry.forget(type_name);
                }
                return Err(e);
            }
        };
        let compressed = is_new.then(|| child.state.registry.compress_name(&desc.name));
        if compressed.is_some() {
            tracing::debug!(type_name = %desc.name, class_id, "emitting class descriptor");
        }
        let result = write_body(
            &mut child,
            provider,
            compressed.as_deref(),
            &desc,
            class_id,
            &values,
            write_null_fields,
        )
        .and_then(|()| child.finish());
        // Part of the object may already be on the wire.
        if result.is_err() {
            self.state.poisoned = true;
        }
        result
    }

    /// Encodes an array of objects; `None` is written as `Null`.
    pub fn write_object_array<P>(
        &mut self,
        id: u16,
        provider: &P,
        objects: Option<&[Option<P::Object>]>,
        write_null_fields: bool,
    ) -> Result<(), DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        let Some(objects) = objects else {
            return self.write_null(id);
        };
        let mut items = self.start_object_array(id, objects.len())?;
        let result = objects
            .iter()
            .try_for_each(|object| {
                items.write_object(1, provider, object.as_ref(), write_null_fields)
            })
            .and_then(|()| items.finish());
        // The element count is already on the wire.
        if result.is_err() {
            self.state.poisoned = true;
        }
        result
    }

    /// Writes any value with the tag it carries; `None` is written as `Null`.
    pub fn write_value<P>(
        &mut self,
        id: u16,
        provider: &P,
        value: Option<&Value<P::Object>>,
        write_null_fields: bool,
    ) -> Result<(), DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        let Some(value) = value else {
            return self.write_null(id);
        };
        match value {
            Value::Bool(v) => self.write_bool(id, *v),
            Value::Byte(v) => self.write_byte(id, *v),
            Value::Short(v) => self.write_short(id, *v),
            Value::Int(v) => self.write_int(id, *v),
            Value::Long(v) => self.write_long(id, *v),
            Value::Float(v) => self.write_float(id, *v),
            Value::Double(v) => self.write_double(id, *v),
            Value::Char(v) => self.write_char(id, *v),
            Value::String(v) => self.write_string(id, Some(v.as_str())),
            Value::Array(v) => self.write_array(id, Some(v)),
            Value::Objects(v) => {
                self.write_object_array(id, provider, Some(v.as_slice()), write_null_fields)
            }
            Value::Object(v) => self.write_object(id, provider, Some(&**v), write_null_fields),
        }
    }

    /// Writes the end marker and closes this level.
    ///
    /// Finishing the root also pushes all buffered bytes to the sink.
    pub fn finish(mut self) -> Result<(), DataError> {
        self.begin()?;
        encode_end(&mut self.state.buf);
        self.state.depth = self.level - 1;
        if self.level == 1 {
            self.flush()
        } else {
            self.state.maybe_flush()
        }
    }

    /// Pushes buffered bytes to the sink and flushes it.
    pub fn flush(&mut self) -> Result<(), DataError> {
        self.state.flush_buf()?;
        self.state.sink.flush().map_err(|e| self.state.fail(e.into()))
    }
}

fn write_body<W, P>(
    child: &mut Writer<'_, W>,
    provider: &P,
    compressed_name: Option<&[u8]>,
    desc: &ClassDescriptor,
    class_id: i32,
    values: &[(u16, Option<Value<P::Object>>)],
    write_null_fields: bool,
) -> Result<(), DataError>
where
    W: Write,
    P: SchemaProvider + ?Sized,
{
    if let Some(name) = compressed_name {
        write_descriptor(child, name, desc)?;
    }
    child.write_int(CLASS_ID_FIELD, class_id)?;
    for (field_id, value) in values {
        child.write_value(*field_id, provider, value.as_ref(), write_null_fields)?;
    }
    Ok(())
}
