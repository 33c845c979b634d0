//! Sequential decoder.
//!
//! A [`ReadSession`] owns the source and the class registry; [`Reader`]
//! handles borrow it the same way writer handles do. Every reader keeps at
//! most one buffered field header. A child reader that is dropped before its
//! end marker is drained by the parent's next operation, so the cursor always
//! resumes at the parent's next field.

use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::config::{CLASS_ID_FIELD, CLASS_META_FIELD, Config};
use crate::error::DataError;
use crate::schema::registry::{ReadRegistry, meta};
use crate::schema::{ClassDescriptor, SchemaProvider};
use crate::types::{Array, FieldType, Value};
use crate::wire::decode::{self, check_len, decode_utf8, packed_size};
use crate::wire::header::{HeaderStart, decode_extended, decode_start};
use crate::wire::{FieldHeader, TypeTag};

/// A field header whose value has not been consumed yet. For arrays the
/// element tag is read together with the header.
#[derive(Debug, Clone, Copy)]
struct Pending {
    header: FieldHeader,
    element: Option<TypeTag>,
}

/// What kind of field sequence a level holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The top-level field sequence.
    Root,
    /// An encoded object; fields 1 and 2 are its metadata.
    Object,
    /// The elements of an object array, each under field id 1.
    Elements,
}

/// A class-metadata block as read from the wire, not yet recorded.
#[derive(Debug)]
struct MetaBlock {
    name: Vec<u8>,
    class_id: u32,
    fields: BTreeMap<u16, String>,
}

/// A metadata block read at `level`. It is recorded only if the next field of
/// that level is the class-id reference; otherwise the block was plain data.
#[derive(Debug)]
struct Held {
    level: usize,
    block: MetaBlock,
}

/// Shared state of one read session.
pub(crate) struct ReadState<R> {
    source: R,
    /// Number of open levels; the root is level 1, 0 once closed.
    depth: usize,
    /// Scope of every open level, indexed by level - 1.
    scopes: Vec<Scope>,
    pending: Option<Pending>,
    held: Option<Held>,
    /// Set by closing the root reader.
    closed: bool,
    poisoned: bool,
    registry: ReadRegistry,
    config: Config,
    position: u64,
}

impl<R: Read> ReadState<R> {
    fn fail(&mut self, e: DataError) -> DataError {
        if matches!(e, DataError::Protocol(_) | DataError::Io(_)) {
            self.poisoned = true;
        }
        e
    }

    fn guard<T>(&mut self, result: Result<T, DataError>) -> Result<T, DataError> {
        result.map_err(|e| self.fail(e))
    }

    fn scope(&self, level: usize) -> Scope {
        level
            .checked_sub(1)
            .and_then(|index| self.scopes.get(index))
            .copied()
            .unwrap_or(Scope::Root)
    }

    fn close_level(&mut self, level: usize) {
        self.pending = None;
        if self.held.as_ref().is_some_and(|h| h.level >= level) {
            self.held = None;
        }
        self.depth = level - 1;
        self.scopes.truncate(level - 1);
    }

    fn check_level(&self, level: usize) -> Result<(), DataError> {
        if level > self.config.max_depth {
            return Err(DataError::Protocol(format!(
                "nesting deeper than {} levels",
                self.config.max_depth
            )));
        }
        Ok(())
    }

    // -- Raw input --

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DataError> {
        self.source.read_exact(buf).map_err(DataError::from_read)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DataError> {
        let mut bytes = [0u8; N];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads `len` bytes without trusting `len` for the allocation size.
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, DataError> {
        let mut data = Vec::new();
        let n = (&mut self.source)
            .take(len as u64)
            .read_to_end(&mut data)
            .map_err(DataError::from_read)?;
        self.position += n as u64;
        if n < len {
            return Err(DataError::protocol("unexpected end of data"));
        }
        Ok(data)
    }

    fn discard(&mut self, len: u64) -> Result<(), DataError> {
        let n = io::copy(&mut (&mut self.source).take(len), &mut io::sink())
            .map_err(DataError::from_read)?;
        self.position += n;
        if n < len {
            return Err(DataError::protocol("unexpected end of data"));
        }
        Ok(())
    }

    fn read_len(&mut self, allow_null: bool) -> Result<Option<usize>, DataError> {
        let raw = self.read_i32()?;
        check_len(raw, self.config.max_length, allow_null)
    }

    fn read_size(&mut self) -> Result<usize, DataError> {
        Ok(self.read_len(false)?.unwrap_or_default())
    }

    fn read_bool(&mut self) -> Result<bool, DataError> {
        decode::decode_bool(&mut &self.read_fixed::<1>()?[..])
    }

    fn read_u8(&mut self) -> Result<u8, DataError> {
        decode::decode_byte(&mut &self.read_fixed::<1>()?[..])
    }

    fn read_i16(&mut self) -> Result<i16, DataError> {
        decode::decode_short(&mut &self.read_fixed::<2>()?[..])
    }

    fn read_i32(&mut self) -> Result<i32, DataError> {
        decode::decode_int(&mut &self.read_fixed::<4>()?[..])
    }

    fn read_i64(&mut self) -> Result<i64, DataError> {
        decode::decode_long(&mut &self.read_fixed::<8>()?[..])
    }

    fn read_f32(&mut self) -> Result<f32, DataError> {
        decode::decode_float(&mut &self.read_fixed::<4>()?[..])
    }

    fn read_f64(&mut self) -> Result<f64, DataError> {
        decode::decode_double(&mut &self.read_fixed::<8>()?[..])
    }

    fn read_char(&mut self) -> Result<char, DataError> {
        decode::decode_char(&mut &self.read_fixed::<2>()?[..])
    }

    fn read_str(&mut self) -> Result<String, DataError> {
        let len = self.read_size()?;
        decode_utf8(self.read_vec(len)?)
    }

    fn next_header(&mut self) -> Result<Pending, DataError> {
        let [byte] = self.read_fixed::<1>()?;
        let header = match decode_start(byte)? {
            HeaderStart::Complete(header) => header,
            HeaderStart::Extended(tag) => {
                let id = u16::from_be_bytes(self.read_fixed::<2>()?);
                decode_extended(tag, id)?
            }
        };
        let element = if header.tag == TypeTag::Array {
            let [id] = self.read_fixed::<1>()?;
            let element = TypeTag::from_id(id)?;
            if !element.is_element() {
                return Err(DataError::Protocol(format!(
                    "{element} is not a valid array element type"
                )));
            }
            Some(element)
        } else {
            None
        };
        Ok(Pending { header, element })
    }

    /// Reads the next header of `level`, settling a metadata block held there.
    fn next_field(&mut self, level: usize) -> Result<Pending, DataError> {
        let p = self.next_header()?;
        if let Some(held) = self.held.take_if(|h| h.level == level) {
            if !p.header.is_end()
                && p.header.tag == TypeTag::Int
                && p.header.id == CLASS_ID_FIELD
            {
                let MetaBlock {
                    name,
                    class_id,
                    fields,
                } = held.block;
                self.registry.absorb(&name, class_id, fields)?;
            } else {
                tracing::trace!(level, "field #1 is not class metadata, ignored");
            }
        }
        Ok(p)
    }

    fn read_array_body(&mut self, element: TypeTag) -> Result<Array, DataError> {
        if element == TypeTag::Object {
            return Err(DataError::protocol(
                "object arrays must be read element by element",
            ));
        }
        let count = self.read_size()?;
        if element == TypeTag::String {
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let item = match self.read_len(true)? {
                    Some(len) => Some(decode_utf8(self.read_vec(len)?)?),
                    None => None,
                };
                items.push(item);
            }
            return Ok(Array::String(items));
        }
        let size = packed_size(element, count)?;
        let data = self.read_vec(size)?;
        decode::decode_fixed_elements(&mut &data[..], element, count)
    }

    // -- Skipping --

    /// Skips one field of a level in `scope`. Inside objects a metadata
    /// block is parsed and held, so a class-id reference after it resolves.
    fn skip_field(&mut self, p: Pending, level: usize, scope: Scope) -> Result<(), DataError> {
        if scope == Scope::Object
            && p.header.tag == TypeTag::Object
            && p.header.id == CLASS_META_FIELD
        {
            return self.hold_meta_block(level);
        }
        self.skip_value(p, level)
    }

    fn skip_value(&mut self, p: Pending, level: usize) -> Result<(), DataError> {
        match p.header.tag {
            TypeTag::String => {
                let len = self.read_size()?;
                self.discard(len as u64)
            }
            TypeTag::Array => {
                let element = p
                    .element
                    .ok_or_else(|| DataError::protocol("array without element tag"))?;
                self.skip_array(element, level)
            }
            TypeTag::Object => self.skip_object(level + 1, Scope::Object),
            TypeTag::EndOfObject => Err(DataError::protocol("unexpected end marker")),
            tag => {
                let size = tag.fixed_size().unwrap_or_default();
                self.discard(size as u64)
            }
        }
    }

    fn skip_array(&mut self, element: TypeTag, level: usize) -> Result<(), DataError> {
        let count = self.read_size()?;
        match element {
            TypeTag::String => {
                for _ in 0..count {
                    if let Some(len) = self.read_len(true)? {
                        self.discard(len as u64)?;
                    }
                }
                Ok(())
            }
            TypeTag::Object => self.skip_object(level + 1, Scope::Elements),
            _ => {
                let size = packed_size(element, count)?;
                self.discard(size as u64)
            }
        }
    }

    /// Skips the body of a level up to and including its end marker.
    fn skip_object(&mut self, level: usize, scope: Scope) -> Result<(), DataError> {
        self.check_level(level)?;
        loop {
            let p = self.next_field(level)?;
            if p.header.is_end() {
                return Ok(());
            }
            self.skip_field(p, level, scope)?;
        }
    }

    /// Discards the rest of the open `level`, buffered field included.
    fn drain_level(&mut self, level: usize) -> Result<(), DataError> {
        let scope = self.scope(level);
        if let Some(p) = self.pending.take() {
            self.skip_field(p, level, scope)?;
        }
        loop {
            let p = self.next_field(level)?;
            if p.header.is_end() {
                self.close_level(level);
                return Ok(());
            }
            self.skip_field(p, level, scope)?;
        }
    }

    // -- Class metadata --

    /// Reads the body of a metadata block nested at `level`. A block lacking
    /// a name or a valid class id is consumed and yields `None`.
    fn read_meta_block(&mut self, level: usize) -> Result<Option<MetaBlock>, DataError> {
        self.check_level(level)?;
        let mut name = None;
        let mut class_id = None;
        let mut fields = BTreeMap::new();
        loop {
            let p = self.next_header()?;
            if p.header.is_end() {
                break;
            }
            match (p.header.id, p.header.tag, p.element) {
                (meta::NAME, TypeTag::Array, Some(TypeTag::Byte)) => {
                    let len = self.read_size()?;
                    name = Some(self.read_vec(len)?);
                }
                (meta::CLASS_ID, TypeTag::Int, _) => class_id = Some(self.read_i32()?),
                (meta::FIELDS, TypeTag::Object, _) => fields = self.read_field_names(level + 1)?,
                _ => self.skip_value(p, level)?,
            }
        }

        let (Some(name), Some(class_id)) = (name, class_id) else {
            return Ok(None);
        };
        let Ok(class_id) = u32::try_from(class_id) else {
            return Ok(None);
        };
        Ok(Some(MetaBlock {
            name,
            class_id,
            fields,
        }))
    }

    /// Reads the metadata block under field #1 of `level` and holds it until
    /// the next field of that level shows whether it belongs to an object.
    fn hold_meta_block(&mut self, level: usize) -> Result<(), DataError> {
        self.held = self
            .read_meta_block(level + 1)?
            .map(|block| Held { level, block });
        Ok(())
    }

    fn read_field_names(&mut self, level: usize) -> Result<BTreeMap<u16, String>, DataError> {
        self.check_level(level)?;
        let mut names = BTreeMap::new();
        loop {
            let p = self.next_header()?;
            if p.header.is_end() {
                return Ok(names);
            }
            if p.header.tag == TypeTag::String {
                names.insert(p.header.id, self.read_str()?);
            } else {
                self.skip_value(p, level)?;
            }
        }
    }
}

/// The root of a read session.
///
/// ```
/// use dataio::{ReadSession, WriteSession};
///
/// let mut session = WriteSession::new(Vec::new());
/// let mut root = session.writer();
/// root.write_int(3, 42)?;
/// root.finish()?;
/// let bytes = session.into_inner()?;
///
/// let mut session = ReadSession::new(&bytes[..]);
/// let mut root = session.reader();
/// assert!(root.has_next_field()?);
/// assert_eq!(root.field_id(), Some(3));
/// assert_eq!(root.read_int()?, Some(42));
/// assert!(!root.has_next_field()?);
/// # Ok::<(), dataio::DataError>(())
/// ```
pub struct ReadSession<R> {
    state: ReadState<R>,
}

impl<R: Read> ReadSession<R> {
    pub fn new(source: R) -> Self {
        Self::build(source, Config::default())
    }

    pub fn with_config(source: R, config: Config) -> Result<Self, DataError> {
        config.validate()?;
        Ok(Self::build(source, config))
    }

    fn build(source: R, config: Config) -> Self {
        Self {
            state: ReadState {
                source,
                depth: 1,
                scopes: vec![Scope::Root],
                pending: None,
                held: None,
                closed: false,
                poisoned: false,
                registry: ReadRegistry::new(),
                config,
                position: 0,
            },
        }
    }

    /// Handle on the root field sequence.
    pub fn reader(&mut self) -> Reader<'_, R> {
        Reader {
            state: &mut self.state,
            level: 1,
        }
    }

    /// Whether the root end marker has been read or the root was closed.
    pub fn is_closed(&self) -> bool {
        self.state.closed || self.state.depth == 0
    }

    /// Bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.state.position
    }

    pub fn registry(&self) -> &ReadRegistry {
        &self.state.registry
    }

    pub fn into_inner(self) -> R {
        self.state.source
    }
}

/// A handle reading the fields of one level: the root stream, one nested
/// object, or the elements of an object array.
pub struct Reader<'s, R> {
    state: &'s mut ReadState<R>,
    level: usize,
}

impl<'s, R: Read> Reader<'s, R> {
    /// Nesting level of this handle; the root is 1.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Checks the stream is usable and drains any open child.
    fn begin(&mut self) -> Result<(), DataError> {
        if self.state.poisoned {
            return Err(DataError::protocol("stream is in a failed state"));
        }
        if self.state.closed || self.state.depth < self.level {
            return Err(DataError::protocol("stream already closed"));
        }
        while self.state.depth > self.level {
            let depth = self.state.depth;
            tracing::debug!(level = depth, "draining unfinished child reader");
            let result = self.state.drain_level(depth);
            self.state.guard(result)?;
        }
        Ok(())
    }

    /// Buffers the next field header unless one is already buffered.
    ///
    /// Returns `false` once the end marker of this level has been read, and
    /// keeps returning `false` afterwards.
    pub fn has_next_field(&mut self) -> Result<bool, DataError> {
        if !self.state.poisoned && !self.state.closed && self.state.depth < self.level {
            return Ok(false);
        }
        self.begin()?;
        if self.state.pending.is_none() {
            let result = self.state.next_field(self.level);
            let p = self.state.guard(result)?;
            if p.header.is_end() {
                self.state.close_level(self.level);
                return Ok(false);
            }
            self.state.pending = Some(p);
        }
        Ok(true)
    }

    fn buffered(&mut self) -> Result<Pending, DataError> {
        if self.has_next_field()? {
            if let Some(p) = self.state.pending {
                return Ok(p);
            }
        }
        Err(DataError::protocol("no field left to read"))
    }

    fn peek(&self) -> Option<Pending> {
        if self.state.depth == self.level {
            self.state.pending
        } else {
            None
        }
    }

    /// The buffered field header, if any.
    pub fn current(&self) -> Option<FieldHeader> {
        self.peek().map(|p| p.header)
    }

    pub fn field_id(&self) -> Option<u16> {
        self.current().map(|h| h.id)
    }

    pub fn field_tag(&self) -> Option<TypeTag> {
        self.current().map(|h| h.tag)
    }

    /// Element tag of a buffered array field.
    pub fn array_element(&self) -> Option<TypeTag> {
        self.peek().and_then(|p| p.element)
    }

    pub fn is_null(&self) -> bool {
        self.field_tag() == Some(TypeTag::Null)
    }

    pub fn is_object(&self) -> bool {
        self.field_tag() == Some(TypeTag::Object)
    }

    pub fn is_numeric(&self) -> bool {
        self.field_tag().is_some_and(TypeTag::is_numeric)
    }

    pub fn is_string(&self) -> bool {
        self.field_tag() == Some(TypeTag::String)
    }

    pub fn is_array(&self) -> bool {
        self.field_tag() == Some(TypeTag::Array)
    }

    fn mismatch(&mut self, expected: &str, found: Pending) -> DataError {
        let found = match found.element {
            Some(element) => format!("{element}[]#{}", found.header.id),
            None => found.header.to_string(),
        };
        self.state.fail(DataError::Protocol(format!(
            "expected {expected}, found {found}"
        )))
    }

    /// Consumes the buffered header if it is `expected` or `Null`.
    fn take(&mut self, expected: TypeTag) -> Result<Option<Pending>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag == TypeTag::Null {
            self.state.pending = None;
            return Ok(None);
        }
        if p.header.tag != expected {
            return Err(self.mismatch(&expected.to_string(), p));
        }
        self.state.pending = None;
        Ok(Some(p))
    }

    fn read_scalar<T>(
        &mut self,
        tag: TypeTag,
        read: impl FnOnce(&mut ReadState<R>) -> Result<T, DataError>,
    ) -> Result<Option<T>, DataError> {
        if self.take(tag)?.is_none() {
            return Ok(None);
        }
        let result = read(&mut *self.state);
        self.state.guard(result).map(Some)
    }

    pub fn read_bool(&mut self) -> Result<Option<bool>, DataError> {
        self.read_scalar(TypeTag::Bool, ReadState::read_bool)
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>, DataError> {
        self.read_scalar(TypeTag::Byte, ReadState::read_u8)
    }

    pub fn read_short(&mut self) -> Result<Option<i16>, DataError> {
        self.read_scalar(TypeTag::Short, ReadState::read_i16)
    }

    pub fn read_int(&mut self) -> Result<Option<i32>, DataError> {
        self.read_scalar(TypeTag::Int, ReadState::read_i32)
    }

    pub fn read_long(&mut self) -> Result<Option<i64>, DataError> {
        self.read_scalar(TypeTag::Long, ReadState::read_i64)
    }

    pub fn read_float(&mut self) -> Result<Option<f32>, DataError> {
        self.read_scalar(TypeTag::Float, ReadState::read_f32)
    }

    pub fn read_double(&mut self) -> Result<Option<f64>, DataError> {
        self.read_scalar(TypeTag::Double, ReadState::read_f64)
    }

    pub fn read_char(&mut self) -> Result<Option<char>, DataError> {
        self.read_scalar(TypeTag::Char, ReadState::read_char)
    }

    pub fn read_string(&mut self) -> Result<Option<String>, DataError> {
        self.read_scalar(TypeTag::String, ReadState::read_str)
    }

    /// Reads a scalar or string array. Object arrays go through
    /// [`read_object_array`](Self::read_object_array) or
    /// [`start_object_array`](Self::start_object_array).
    pub fn read_array(&mut self) -> Result<Option<Array>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.element == Some(TypeTag::Object) {
            return Err(self.mismatch("a scalar or string array", p));
        }
        let Some(p) = self.take(TypeTag::Array)? else {
            return Ok(None);
        };
        let result = match p.element {
            Some(element) => self.state.read_array_body(element),
            None => Err(DataError::protocol("array without element tag")),
        };
        self.state.guard(result).map(Some)
    }

    /// Reads a byte array without unpacking it into an [`Array`].
    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag == TypeTag::Array && p.element != Some(TypeTag::Byte) {
            return Err(self.mismatch("Byte[]", p));
        }
        self.read_scalar(TypeTag::Array, |state| {
            let len = state.read_size()?;
            state.read_vec(len)
        })
    }

    /// Discards the buffered field whatever its tag.
    pub fn skip(&mut self) -> Result<(), DataError> {
        self.begin()?;
        let p = self.buffered()?;
        self.state.pending = None;
        tracing::trace!(field = %p.header, "skipping field");
        let scope = self.state.scope(self.level);
        let result = self.state.skip_field(p, self.level, scope);
        self.state.guard(result)
    }

    fn open_child(&mut self, scope: Scope) -> Result<Reader<'_, R>, DataError> {
        let level = self.level + 1;
        if let Err(e) = self.state.check_level(level) {
            return Err(self.state.fail(e));
        }
        self.state.pending = None;
        self.state.depth = level;
        self.state.scopes.push(scope);
        Ok(Reader {
            state: &mut *self.state,
            level,
        })
    }

    /// Opens the buffered `Object` field as a child reader.
    pub fn start_object(&mut self) -> Result<Reader<'_, R>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag != TypeTag::Object {
            return Err(self.mismatch("Object", p));
        }
        self.open_child(Scope::Object)
    }

    /// Opens the buffered object array, returning its declared element count
    /// and a reader over its elements, or `None` for a `Null` field.
    pub fn start_object_array(&mut self) -> Result<Option<(usize, Reader<'_, R>)>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag == TypeTag::Null {
            self.state.pending = None;
            return Ok(None);
        }
        if p.header.tag != TypeTag::Array || p.element != Some(TypeTag::Object) {
            return Err(self.mismatch("Object[]", p));
        }
        self.state.pending = None;
        let result = self.state.read_size();
        let count = self.state.guard(result)?;
        let items = self.open_child(Scope::Elements)?;
        Ok(Some((count, items)))
    }

    /// Reads the buffered class-metadata block.
    ///
    /// The block enters the session registry once the class-id field that
    /// follows it is read; a block with no class id after it was plain data
    /// and is dropped. Returns the descriptor it describes, or `None` if the
    /// object is not a well-formed metadata block.
    pub fn read_class_descriptor(&mut self) -> Result<Option<ClassDescriptor>, DataError> {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag != TypeTag::Object {
            return Err(self.mismatch("Object", p));
        }
        self.state.pending = None;
        let result = self.state.hold_meta_block(self.level);
        self.state.guard(result)?;
        let Some(Held { block, .. }) = &self.state.held else {
            return Ok(None);
        };
        match self
            .state
            .registry
            .preview(&block.name, block.class_id, &block.fields)
        {
            Ok(desc) => Ok(Some(desc)),
            Err(e) => {
                tracing::trace!(error = %e, "field #1 does not name a class");
                Ok(None)
            }
        }
    }

    /// Decodes the buffered object through the schema provider.
    ///
    /// Fields the local schema does not know, or declares with another type,
    /// are skipped. A value rejected by [`SchemaProvider::set_field`] with a
    /// non-fatal error is logged and left unset. An object whose type the
    /// provider cannot instantiate is skipped whole and reported as
    /// [`DataError::UnknownType`]; the stream stays usable.
    pub fn read_object<P>(&mut self, provider: &P) -> Result<Option<P::Object>, DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        self.begin()?;
        let p = self.buffered()?;
        if p.header.tag == TypeTag::Null {
            self.state.pending = None;
            return Ok(None);
        }
        let mut child = self.start_object()?;
        match child.read_body(provider) {
            Ok(object) => {
                child.close()?;
                Ok(Some(object))
            }
            Err(e) if !child.state.poisoned => {
                child.close()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn read_body<P>(&mut self, provider: &P) -> Result<P::Object, DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        let mut p = self.buffered()?;
        if p.header.tag == TypeTag::Object && p.header.id == CLASS_META_FIELD {
            self.read_class_descriptor()?;
            p = self.buffered()?;
        }
        if p.header.tag != TypeTag::Int || p.header.id != CLASS_ID_FIELD {
            return Err(self.mismatch("class id Int#2", p));
        }
        let class_id = self.read_int()?.unwrap_or_default();
        let class_id = u32::try_from(class_id).map_err(|_| {
            self.state
                .fail(DataError::Protocol(format!("negative class id {class_id}")))
        })?;
        let result = self.state.registry.bind(class_id, provider);
        let desc = self.state.guard(result)?;

        let mut object = provider
            .instantiate(&desc.name)
            .ok_or_else(|| DataError::UnknownType(desc.name.clone()))?;

        while self.has_next_field()? {
            let p = self.buffered()?;
            let id = p.header.id;
            let Some((name, ty)) = desc
                .field(id)
                .and_then(|f| f.ty.map(|ty| (f.name.as_str(), ty)))
            else {
                tracing::trace!(type_name = %desc.name, field = id, "no local field, skipping");
                self.skip()?;
                continue;
            };

            let value = if p.header.tag == TypeTag::Null {
                self.state.pending = None;
                None
            } else if ty.accepts(p.header.tag, p.element) {
                match self.read_value(provider, ty) {
                    Ok(value) => value,
                    Err(DataError::UnknownType(nested)) => {
                        tracing::warn!(
                            type_name = %desc.name,
                            field = name,
                            nested = %nested,
                            "nested type unknown locally, skipping"
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                tracing::warn!(
                    type_name = %desc.name,
                    field = name,
                    declared = %ty,
                    found = %p.header.tag,
                    "field type changed, skipping"
                );
                self.skip()?;
                continue;
            };

            if let Err(e) = provider.set_field(&mut object, name, value) {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!(type_name = %desc.name, field = name, error = %e, "field not applied");
            }
        }
        Ok(object)
    }

    /// Decodes the buffered object array through the schema provider.
    pub fn read_object_array<P>(
        &mut self,
        provider: &P,
    ) -> Result<Option<Vec<Option<P::Object>>>, DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        let Some((count, mut items)) = self.start_object_array()? else {
            return Ok(None);
        };
        let mut objects = Vec::with_capacity(count.min(1024));
        while items.has_next_field()? {
            if items.field_id() != Some(1) {
                let p = items.buffered()?;
                return Err(items.mismatch("object array element #1", p));
            }
            objects.push(items.read_object(provider)?);
        }
        if objects.len() != count {
            return Err(self.state.fail(DataError::Protocol(format!(
                "object array declared {count} elements, found {}",
                objects.len()
            ))));
        }
        Ok(Some(objects))
    }

    /// Reads the buffered field as a value of type `ty`; `Null` yields `None`.
    pub fn read_value<P>(
        &mut self,
        provider: &P,
        ty: FieldType,
    ) -> Result<Option<Value<P::Object>>, DataError>
    where
        P: SchemaProvider + ?Sized,
    {
        Ok(match ty.tag {
            TypeTag::Bool => self.read_bool()?.map(Value::Bool),
            TypeTag::Byte => self.read_byte()?.map(Value::Byte),
            TypeTag::Short => self.read_short()?.map(Value::Short),
            TypeTag::Int => self.read_int()?.map(Value::Int),
            TypeTag::Long => self.read_long()?.map(Value::Long),
            TypeTag::Float => self.read_float()?.map(Value::Float),
            TypeTag::Double => self.read_double()?.map(Value::Double),
            TypeTag::Char => self.read_char()?.map(Value::Char),
            TypeTag::String => self.read_string()?.map(Value::String),
            TypeTag::Array if ty.element == Some(TypeTag::Object) => {
                self.read_object_array(provider)?.map(Value::Objects)
            }
            TypeTag::Array => self.read_array()?.map(Value::Array),
            TypeTag::Object => self
                .read_object(provider)?
                .map(|object| Value::Object(Box::new(object))),
            TypeTag::Null | TypeTag::EndOfObject => {
                return Err(DataError::Protocol(format!("{ty} is not a value type")));
            }
        })
    }

    /// Releases this reader. Open descendants are drained; a child reader
    /// also drains its own remaining fields so the parent can continue.
    pub fn close(mut self) -> Result<(), DataError> {
        if self.level == 1 {
            if self.state.depth > 1 && !self.state.poisoned {
                self.begin()?;
            }
            self.state.close_level(1);
            self.state.closed = true;
            return Ok(());
        }
        if !self.state.poisoned && self.state.depth < self.level {
            return Ok(());
        }
        self.begin()?;
        let result = self.state.drain_level(self.level);
        self.state.guard(result)
    }
}
