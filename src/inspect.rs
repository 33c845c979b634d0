//! Schema-less rendering of encoded documents.
//!
//! Documents are self-describing, so any stream can be walked without a
//! [`SchemaProvider`](crate::schema::SchemaProvider). Class metadata blocks are
//! decoded and shown by type name.

use std::fmt::Display;
use std::io::Read;

use crate::config::{CLASS_META_FIELD, Config};
use crate::error::DataError;
use crate::stream::{ReadSession, Reader};
use crate::types::Value;
use crate::wire::TypeTag;

/// Renders a document as an indented field tree, one field per line.
///
/// ```
/// use dataio::{Config, WriteSession, inspect};
///
/// let mut session = WriteSession::new(Vec::new());
/// let mut root = session.writer();
/// root.write_int(3, 7)?;
/// root.write_string(4, Some("seven"))?;
/// root.finish()?;
/// let bytes = session.into_inner()?;
///
/// let text = inspect::dump(&bytes[..], Config::default())?;
/// assert_eq!(text, "#3 Int 7\n#4 String \"seven\"\n");
/// # Ok::<(), dataio::DataError>(())
/// ```
pub fn dump<R: Read>(source: R, config: Config) -> Result<String, DataError> {
    let mut session = ReadSession::with_config(source, config)?;
    let mut out = String::new();
    dump_fields(&mut session.reader(), 0, false, &mut out)?;
    Ok(out)
}

fn line(out: &mut String, indent: usize, text: impl Display) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(&text.to_string());
    out.push('\n');
}

fn dump_fields<R: Read>(
    reader: &mut Reader<'_, R>,
    indent: usize,
    in_object: bool,
    out: &mut String,
) -> Result<(), DataError> {
    while reader.has_next_field()? {
        let Some(header) = reader.current() else {
            break;
        };
        let id = header.id;
        match header.tag {
            TypeTag::Object if in_object && id == CLASS_META_FIELD => {
                match reader.read_class_descriptor()? {
                    Some(desc) => {
                        let header = format!("#{id} class {} = {}", desc.name, desc.class_id);
                        line(out, indent, header);
                        for field in desc.fields.values() {
                            line(out, indent + 1, format!("#{} {}", field.id, field.name));
                        }
                    }
                    None => line(out, indent, format_args!("#{id} class <incomplete>")),
                }
            }
            TypeTag::Object => {
                line(out, indent, format_args!("#{id} Object"));
                let mut child = reader.start_object()?;
                dump_fields(&mut child, indent + 1, true, out)?;
            }
            TypeTag::Array if reader.array_element() == Some(TypeTag::Object) => {
                if let Some((count, mut items)) = reader.start_object_array()? {
                    line(out, indent, format_args!("#{id} Object[{count}]"));
                    dump_fields(&mut items, indent + 1, false, out)?;
                }
            }
            TypeTag::Array => {
                let element = reader.array_element();
                if let Some(array) = reader.read_array()? {
                    let element = element.unwrap_or(TypeTag::Byte);
                    line(
                        out,
                        indent,
                        format_args!("#{id} {element}[{}] {array}", array.len()),
                    );
                }
            }
            TypeTag::Null => {
                reader.skip()?;
                line(out, indent, format_args!("#{id} Null"));
            }
            tag => {
                if let Some(value) = read_scalar(reader, tag)? {
                    line(out, indent, format_args!("#{id} {tag} {value}"));
                }
            }
        }
    }
    Ok(())
}

fn read_scalar<R: Read>(
    reader: &mut Reader<'_, R>,
    tag: TypeTag,
) -> Result<Option<Value<()>>, DataError> {
    Ok(match tag {
        TypeTag::Bool => reader.read_bool()?.map(Value::Bool),
        TypeTag::Byte => reader.read_byte()?.map(Value::Byte),
        TypeTag::Short => reader.read_short()?.map(Value::Short),
        TypeTag::Int => reader.read_int()?.map(Value::Int),
        TypeTag::Long => reader.read_long()?.map(Value::Long),
        TypeTag::Float => reader.read_float()?.map(Value::Float),
        TypeTag::Double => reader.read_double()?.map(Value::Double),
        TypeTag::Char => reader.read_char()?.map(Value::Char),
        TypeTag::String => reader.read_string()?.map(Value::String),
        _ => {
            reader.skip()?;
            None
        }
    })
}
