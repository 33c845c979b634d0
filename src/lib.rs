//! dataio: a version-tolerant, self-describing binary object format.
//!
//! Every value on the wire is preceded by a field header naming its type tag
//! and a field id. Objects are open-ended field sequences closed by an end
//! marker, so a reader can always skip what it does not understand. The first
//! time a type appears in a stream its class descriptor (type name plus the
//! id → name map of its fields) is sent along, and later objects of that type
//! only carry a stream-local class id.
//!
//! # Architecture
//!
//! - **`wire`**: Type tags, field headers and primitive payload codecs
//! - **`types`**: Value, array and field-type model
//! - **`schema`**: The `SchemaProvider` host binding, class descriptors,
//!   per-session registries and name compression
//! - **`stream`**: Writer and reader sessions with nested child streams
//! - **`inspect`**: Schema-less rendering of encoded documents
//!
//! # Example
//!
//! ```
//! use dataio::schema::{DynamicObject, FieldSpec, SchemaTable};
//! use dataio::types::FieldType;
//! use dataio::Config;
//!
//! let schema = SchemaTable::new().with_type(
//!     "geo.Point",
//!     [FieldSpec::new("x", FieldType::INT), FieldSpec::new("y", FieldType::INT)],
//! );
//! let point = DynamicObject::new("geo.Point").with("x", 3).with("y", 4);
//!
//! let bytes = dataio::encode_object(&schema, &point, Config::default())?;
//! let decoded = dataio::decode_object(&schema, &bytes, Config::default())?;
//! assert_eq!(decoded, Some(point));
//! # Ok::<(), dataio::DataError>(())
//! ```

pub mod config;
pub mod error;
pub mod inspect;
pub mod schema;
pub mod stream;
pub mod types;
pub mod wire;

pub use config::Config;
pub use error::{DataError, Result};
pub use schema::{FieldSpec, SchemaProvider};
pub use stream::{ReadSession, Reader, WriteSession, Writer};
pub use types::{Array, FieldType, Value};
pub use wire::TypeTag;

/// Field id the document helpers store their object under.
pub const DOCUMENT_FIELD: u16 = 1;

/// Encodes `object` as a complete document: a root stream holding the object
/// under [`DOCUMENT_FIELD`].
pub fn encode_object<P>(provider: &P, object: &P::Object, config: Config) -> Result<Vec<u8>>
where
    P: SchemaProvider + ?Sized,
{
    let mut session = WriteSession::with_config(Vec::new(), config)?;
    let mut root = session.writer();
    root.write_object(DOCUMENT_FIELD, provider, Some(object), false)?;
    root.finish()?;
    session.into_inner()
}

/// Decodes a document written by [`encode_object`]. Other root fields are
/// skipped; a document without the object field yields `None`.
pub fn decode_object<P>(provider: &P, bytes: &[u8], config: Config) -> Result<Option<P::Object>>
where
    P: SchemaProvider + ?Sized,
{
    let mut session = ReadSession::with_config(bytes, config)?;
    let mut root = session.reader();
    let mut object = None;
    while root.has_next_field()? {
        if root.field_id() == Some(DOCUMENT_FIELD) && object.is_none() {
            object = root.read_object(provider)?;
        } else {
            root.skip()?;
        }
    }
    Ok(object)
}
