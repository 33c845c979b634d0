//! Writer and reader sessions over blocking byte streams.

mod reader;
mod writer;

pub use reader::{ReadSession, Reader};
pub use writer::{WriteSession, Writer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::DataError;
    use crate::schema::{DynamicObject, FieldSpec, SchemaTable};
    use crate::types::{Array, FieldType, Value};
    use crate::wire::TypeTag;

    fn encode(f: impl FnOnce(&mut Writer<'_, Vec<u8>>) -> Result<(), DataError>) -> Vec<u8> {
        let mut session = WriteSession::new(Vec::new());
        let mut root = session.writer();
        f(&mut root).expect("write failed");
        root.finish().expect("finish failed");
        session.into_inner().expect("unfinished")
    }

    fn points() -> SchemaTable {
        SchemaTable::new().with_type(
            "geo.Point",
            [
                FieldSpec::new("x", FieldType::INT),
                FieldSpec::new("y", FieldType::INT),
            ],
        )
    }

    fn point(x: i32, y: i32) -> DynamicObject {
        DynamicObject::new("geo.Point").with("x", x).with("y", y)
    }

    const POINT_BYTES: &[u8] = &[
        0xA1, // Object#1
        0xA1, // class metadata block
        0xB1, 0x02, 0, 0, 0, 13, 0, 0, 0, 0, b'g', b'e', b'o', b'.', b'P', b'o', b'i', b'n', b't',
        0x42, 0, 0, 0, 1, // class id
        0xA3, // field names
        0x93, 0, 0, 0, 1, b'x', //
        0x94, 0, 0, 0, 1, b'y', //
        0xDF, 0xDF, //
        0x42, 0, 0, 0, 1, // class id reference
        0x43, 0, 0, 0, 3, // x
        0x44, 0, 0, 0, 4, // y
        0xDF, // end of Point
        0xDF, // end of root
    ];

    // -- Writer --

    #[test]
    fn point_wire_layout() {
        let schema = points();
        let bytes = encode(|w| w.write_object(1, &schema, Some(&point(3, 4)), false));
        assert_eq!(bytes, POINT_BYTES);
    }

    #[test]
    fn descriptor_sent_once_per_session() {
        let schema = points();
        let bytes = encode(|w| {
            w.write_object(1, &schema, Some(&point(3, 4)), false)?;
            w.write_object(2, &schema, Some(&point(5, 6)), false)
        });
        let second = &bytes[POINT_BYTES.len() - 1..];
        assert_eq!(
            second,
            &[0xA2, 0x42, 0, 0, 0, 1, 0x43, 0, 0, 0, 5, 0x44, 0, 0, 0, 6, 0xDF, 0xDF]
        );
    }

    #[test]
    fn null_fields_written_on_request() {
        let schema = points();
        let half = DynamicObject::new("geo.Point").with("x", 1);
        let with_nulls = encode(|w| w.write_object(1, &schema, Some(&half), true));
        let without = encode(|w| w.write_object(1, &schema, Some(&half), false));
        // Null#4 before the object's end marker
        assert_eq!(&with_nulls[with_nulls.len() - 3..], &[0xC4, 0xDF, 0xDF]);
        assert_eq!(with_nulls.len(), without.len() + 1);
    }

    #[test]
    fn unfinished_child_is_finished_by_parent() {
        let bytes = encode(|w| {
            let mut child = w.start_object(3)?;
            child.write_int(1, 7)?;
            w.write_int(4, 9)
        });
        assert_eq!(bytes, [0xA3, 0x41, 0, 0, 0, 7, 0xDF, 0x44, 0, 0, 0, 9, 0xDF]);
    }

    #[test]
    fn finish_closes_open_descendants() {
        let mut session = WriteSession::new(Vec::new());
        let mut root = session.writer();
        let mut child = root.start_object(1).unwrap();
        let _grandchild = child.start_object(2).unwrap();
        root.finish().unwrap();
        assert!(session.is_finished());
        assert_eq!(session.into_inner().unwrap(), [0xA1, 0xA2, 0xDF, 0xDF, 0xDF]);
    }

    #[test]
    fn write_after_finish_fails() {
        let mut session = WriteSession::new(Vec::new());
        session.writer().finish().unwrap();
        let err = session.writer().write_int(1, 1).unwrap_err();
        assert!(err.to_string().contains("already closed"));
    }

    #[test]
    fn unfinished_root_is_rejected() {
        let mut session = WriteSession::new(Vec::new());
        session.writer().write_int(1, 1).unwrap();
        assert!(session.into_inner().is_err());
    }

    #[test]
    fn rejected_field_leaves_no_bytes() {
        let mut session = WriteSession::new(Vec::new());
        let mut root = session.writer();
        assert!(root.write_char(3, '\u{1F600}').is_err());
        assert!(root.write_array(4, Some(&Array::Char(vec!['a', '\u{1F600}']))).is_err());
        root.write_char(5, 'é').unwrap();
        root.finish().unwrap();
        assert_eq!(session.into_inner().unwrap(), [0x85, 0x00, 0xE9, 0xDF]);
    }

    #[test]
    fn schema_mismatch_does_not_poison() {
        let schema = points();
        let bad = DynamicObject::new("geo.Point").with("x", "three");
        let mut session = WriteSession::new(Vec::new());
        let mut root = session.writer();
        let err = root.write_object(1, &schema, Some(&bad), false).unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }));

        // The descriptor still goes out with the first object that succeeds.
        root.write_object(1, &schema, Some(&point(3, 4)), false).unwrap();
        root.finish().unwrap();
        assert_eq!(session.into_inner().unwrap()[..2], [0xA1, 0xA1]);
    }

    #[test]
    fn unknown_type_on_write() {
        let schema = points();
        let mut session = WriteSession::new(Vec::new());
        let err = session
            .writer()
            .write_object(1, &schema, Some(&DynamicObject::new("geo.Line")), false)
            .unwrap_err();
        assert!(matches!(err, DataError::UnknownType(_)));
    }

    #[test]
    fn write_depth_limit() {
        let config = Config::default().max_depth(2);
        let mut session = WriteSession::with_config(Vec::new(), config).unwrap();
        let mut root = session.writer();
        let mut child = root.start_object(1).unwrap();
        assert!(child.start_object(1).is_err());
    }

    #[test]
    fn small_flush_threshold_streams_to_sink() {
        let config = Config::default().flush_threshold(1);
        let mut session = WriteSession::with_config(Vec::new(), config).unwrap();
        let mut root = session.writer();
        root.write_long(1, -1).unwrap();
        root.finish().unwrap();
        assert_eq!(
            session.into_inner().unwrap(),
            [0x51, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xDF]
        );
    }

    // -- Reader --

    #[test]
    fn point_decodes() {
        let schema = points();
        let mut session = ReadSession::new(POINT_BYTES);
        let mut root = session.reader();
        assert!(root.has_next_field().unwrap());
        assert!(root.is_object());
        let p = root.read_object(&schema).unwrap().unwrap();
        assert_eq!(p, point(3, 4));
        assert!(!root.has_next_field().unwrap());
        assert!(session.is_closed());
        assert_eq!(session.position(), POINT_BYTES.len() as u64);
    }

    #[test]
    fn skipped_object_still_registers_its_class() {
        let schema = points();
        let bytes = encode(|w| {
            w.write_object(1, &schema, Some(&point(3, 4)), false)?;
            w.write_object(2, &schema, Some(&point(5, 6)), false)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        root.skip().unwrap();
        root.has_next_field().unwrap();
        assert_eq!(root.read_object(&schema).unwrap(), Some(point(5, 6)));
    }

    /// `Point#1`, a plain object `#2` holding `{1: {1: name, 2: Int 1}}`, then
    /// `Point#3`.
    fn points_around_lookalike_block(name: &[u8]) -> Vec<u8> {
        let schema = points();
        encode(|w| {
            w.write_object(1, &schema, Some(&point(3, 4)), false)?;
            let mut plain = w.start_object(2)?;
            let mut block = plain.start_object(1)?;
            block.write_bytes(1, Some(name))?;
            block.write_int(2, 1)?;
            block.finish()?;
            plain.finish()?;
            w.write_object(3, &schema, Some(&point(5, 6)), false)
        })
    }

    #[test]
    fn skipped_lookalike_block_leaves_registry_alone() {
        let schema = points();
        // A name that would replace class 1, and one referencing a name never sent.
        for name in [&[0, 0, 0, 0, b'x'][..], &[0, 9, 0, 1, b'x'][..]] {
            let bytes = points_around_lookalike_block(name);
            let mut session = ReadSession::new(&bytes[..]);
            let mut root = session.reader();
            root.has_next_field().unwrap();
            assert_eq!(root.read_object(&schema).unwrap(), Some(point(3, 4)));
            root.has_next_field().unwrap();
            root.skip().unwrap();
            root.has_next_field().unwrap();
            assert_eq!(root.read_object(&schema).unwrap(), Some(point(5, 6)));
            assert!(!root.has_next_field().unwrap());
            assert_eq!(session.registry().len(), 1);
        }
    }

    #[test]
    fn drained_lookalike_block_leaves_registry_alone() {
        let schema = points();
        let bytes = points_around_lookalike_block(&[0, 0, 0, 0, b'x']);
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        root.read_object(&schema).unwrap();
        root.has_next_field().unwrap();
        {
            let mut plain = root.start_object().unwrap();
            assert!(plain.has_next_field().unwrap());
            assert_eq!(plain.field_id(), Some(1));
        }
        assert!(root.has_next_field().unwrap());
        assert_eq!(root.field_id(), Some(3));
        assert_eq!(root.read_object(&schema).unwrap(), Some(point(5, 6)));
    }

    #[test]
    fn lookalike_block_is_readable_as_plain_data() {
        let bytes = points_around_lookalike_block(&[0, 0, 0, 0, b'x']);
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        root.skip().unwrap();
        root.has_next_field().unwrap();
        let mut plain = root.start_object().unwrap();
        plain.has_next_field().unwrap();
        let mut block = plain.start_object().unwrap();
        block.has_next_field().unwrap();
        assert_eq!(block.read_bytes().unwrap(), Some(vec![0, 0, 0, 0, b'x']));
        block.has_next_field().unwrap();
        assert_eq!(block.read_int().unwrap(), Some(1));
        assert!(!block.has_next_field().unwrap());
    }

    #[test]
    fn field_kind_predicates() {
        let bytes = encode(|w| {
            w.write_short(1, 7)?;
            w.write_double(2, 0.5)?;
            w.write_string(3, Some("s"))?;
            w.write_char(4, 'c')?;
            w.write_array(5, Some(&Array::Int(vec![1])))
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        let mut seen = Vec::new();
        while root.has_next_field().unwrap() {
            seen.push((root.is_numeric(), root.is_string(), root.is_array()));
            root.skip().unwrap();
        }
        assert_eq!(
            seen,
            [
                (true, false, false),
                (true, false, false),
                (false, true, false),
                (false, false, false),
                (false, false, true),
            ]
        );
        assert!(!root.is_numeric());
        assert!(!root.is_string());
    }

    #[test]
    fn null_is_accepted_by_every_read() {
        let bytes = encode(|w| {
            for id in 1..=6 {
                w.write_null(id)?;
            }
            Ok(())
        });
        let schema = points();
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        assert!(root.has_next_field().unwrap());
        assert!(root.is_null());
        assert_eq!(root.read_int().unwrap(), None);
        assert_eq!(root.read_string().unwrap(), None);
        assert_eq!(root.read_array().unwrap(), None);
        assert_eq!(root.read_bytes().unwrap(), None);
        assert_eq!(root.read_object(&schema).unwrap(), None);
        assert!(root.start_object_array().unwrap().is_none());
        assert!(!root.has_next_field().unwrap());
    }

    #[test]
    fn typed_read_mismatch_is_fatal() {
        let bytes = encode(|w| w.write_int(1, 5));
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        let err = root.read_string().unwrap_err();
        assert!(err.to_string().contains("expected String"));
        assert!(root.read_int().unwrap_err().to_string().contains("failed state"));
    }

    #[test]
    fn read_after_end_fails() {
        let bytes = encode(|_| Ok(()));
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        assert!(!root.has_next_field().unwrap());
        assert!(!root.has_next_field().unwrap());
        let err = root.read_int().unwrap_err();
        assert!(err.to_string().contains("already closed"));
    }

    #[test]
    fn closed_root_rejects_everything() {
        let bytes = encode(|w| {
            let mut child = w.start_object(1)?;
            child.write_int(1, 1)?;
            child.finish()?;
            w.write_int(2, 2)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        drop(root.start_object().unwrap());
        root.close().unwrap();
        assert!(session.is_closed());

        let mut root = session.reader();
        let err = root.has_next_field().unwrap_err();
        assert!(err.to_string().contains("already closed"));
        assert!(root.skip().is_err());
    }

    #[test]
    fn unread_child_is_drained() {
        let bytes = encode(|w| {
            let mut child = w.start_object(1)?;
            child.write_string(1, Some("inner"))?;
            child.write_array(2, Some(&Array::Long(vec![1, 2, 3])))?;
            let mut grandchild = child.start_object(3)?;
            grandchild.write_bool(1, true)?;
            grandchild.finish()?;
            child.finish()?;
            w.write_int(2, 99)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        {
            let mut child = root.start_object().unwrap();
            assert!(child.has_next_field().unwrap());
            assert_eq!(child.read_string().unwrap().as_deref(), Some("inner"));
            child.has_next_field().unwrap();
            child.has_next_field().unwrap();
            assert_eq!(child.array_element(), Some(TypeTag::Long));
        }
        assert!(root.has_next_field().unwrap());
        assert_eq!(root.field_id(), Some(2));
        assert_eq!(root.read_int().unwrap(), Some(99));
    }

    #[test]
    fn child_close_resumes_parent() {
        let bytes = encode(|w| {
            let mut child = w.start_object(1)?;
            child.write_int(1, 1)?;
            child.write_int(2, 2)?;
            child.finish()?;
            w.write_int(2, 3)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        let mut child = root.start_object().unwrap();
        child.has_next_field().unwrap();
        assert_eq!(child.read_int().unwrap(), Some(1));
        child.close().unwrap();
        root.has_next_field().unwrap();
        assert_eq!(root.read_int().unwrap(), Some(3));
    }

    #[test]
    fn corrupt_end_marker_fails_drain() {
        let mut bytes = encode(|w| {
            let mut child = w.start_object(1)?;
            child.write_int(1, 1)?;
            child.finish()
        });
        // child end marker sits before the root's
        let at = bytes.len() - 2;
        assert_eq!(bytes[at], 0xDF);
        bytes[at] = 0xD3;

        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        drop(root.start_object().unwrap());
        let err = root.has_next_field().unwrap_err();
        assert!(err.to_string().contains("corrupt end-of-object marker"));
        assert!(root.has_next_field().is_err());
    }

    #[test]
    fn truncated_input() {
        let bytes = encode(|w| w.write_string(1, Some("truncated")));
        let mut session = ReadSession::new(&bytes[..8]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        let err = root.read_string().unwrap_err();
        assert!(err.to_string().contains("unexpected end of data"));
    }

    #[test]
    fn oversized_length_rejected() {
        let bytes = encode(|w| w.write_string(1, Some("too long")));
        let config = Config::default().max_length(4);
        let mut session = ReadSession::with_config(&bytes[..], config).unwrap();
        let mut root = session.reader();
        root.has_next_field().unwrap();
        assert!(root.read_string().is_err());
    }

    #[test]
    fn class_id_without_descriptor() {
        let bytes = [0xA1, 0x42, 0, 0, 0, 5, 0xDF, 0xDF];
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        let err = root.read_object(&points()).unwrap_err();
        assert!(err.to_string().contains("class id 5"));
    }

    #[test]
    fn unknown_type_skips_object() {
        let schema = points();
        let bytes = encode(|w| {
            w.write_object(1, &schema, Some(&point(3, 4)), false)?;
            w.write_int(2, 7)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        let err = root.read_object(&SchemaTable::new()).unwrap_err();
        assert!(matches!(err, DataError::UnknownType(ref name) if name == "geo.Point"));
        root.has_next_field().unwrap();
        assert_eq!(root.read_int().unwrap(), Some(7));
    }

    #[test]
    fn read_depth_limit() {
        let bytes = encode(|w| {
            let mut a = w.start_object(1)?;
            let mut b = a.start_object(1)?;
            b.write_int(1, 1)?;
            b.finish()?;
            a.finish()
        });
        let config = Config::default().max_depth(2);
        let mut session = ReadSession::with_config(&bytes[..], config).unwrap();
        let mut root = session.reader();
        root.has_next_field().unwrap();
        assert!(root.skip().is_err());
    }

    /// Writes `Int#1`, the field under test as `#2`, and `Int#3`, then checks
    /// that skipping `#2` lands on `#3`.
    fn assert_skips(write: impl FnOnce(&mut Writer<'_, Vec<u8>>) -> Result<(), DataError>) {
        let bytes = encode(|w| {
            w.write_int(1, 10)?;
            write(w)?;
            w.write_int(3, 30)
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        assert_eq!(root.read_int().unwrap(), Some(10));
        assert!(root.has_next_field().unwrap());
        assert_eq!(root.field_id(), Some(2));
        root.skip().unwrap();
        assert!(root.has_next_field().unwrap());
        assert_eq!(root.field_id(), Some(3));
        assert_eq!(root.read_int().unwrap(), Some(30));
        assert!(!root.has_next_field().unwrap());
    }

    #[test]
    fn skip_scalars() {
        assert_skips(|w| w.write_bool(2, true));
        assert_skips(|w| w.write_byte(2, 0xFF));
        assert_skips(|w| w.write_short(2, -2));
        assert_skips(|w| w.write_int(2, i32::MIN));
        assert_skips(|w| w.write_long(2, i64::MAX));
        assert_skips(|w| w.write_float(2, 1.5));
        assert_skips(|w| w.write_double(2, -0.25));
        assert_skips(|w| w.write_char(2, 'z'));
        assert_skips(|w| w.write_null(2));
    }

    #[test]
    fn skip_strings() {
        assert_skips(|w| w.write_string(2, Some("")));
        assert_skips(|w| w.write_string(2, Some("grüße")));
    }

    #[test]
    fn skip_arrays() {
        assert_skips(|w| w.write_array(2, Some(&Array::Bool(vec![true; 9]))));
        assert_skips(|w| w.write_array(2, Some(&Array::Double(vec![1.0, 2.0]))));
        assert_skips(|w| w.write_array(2, Some(&Array::Int(Vec::new()))));
        assert_skips(|w| {
            w.write_array(
                2,
                Some(&Array::String(vec![Some("a".into()), None, Some(String::new())])),
            )
        });
        assert_skips(|w| w.write_bytes(2, Some(&b"raw"[..])));
    }

    #[test]
    fn skip_objects() {
        assert_skips(|w| {
            let mut child = w.start_object(2)?;
            child.write_string(1, Some("nested"))?;
            let mut grandchild = child.start_object(2)?;
            grandchild.write_long(300, 1)?;
            grandchild.finish()?;
            child.finish()
        });
        let schema = points();
        assert_skips(|w| w.write_object(2, &schema, Some(&point(1, 2)), true));
        let items = [Some(point(1, 2)), None, Some(point(3, 4))];
        assert_skips(|w| w.write_object_array(2, &schema, Some(&items[..]), false));
    }

    #[test]
    fn object_array_round_trip() {
        let schema = points();
        let items = vec![Some(point(1, 2)), None, Some(point(3, 4))];
        let bytes = encode(|w| w.write_object_array(1, &schema, Some(&items[..]), false));
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        assert!(root.is_array());
        assert_eq!(root.array_element(), Some(TypeTag::Object));
        assert_eq!(root.read_object_array(&schema).unwrap(), Some(items));
    }

    #[test]
    fn object_array_count_checked() {
        let schema = points();
        let mut bytes = encode(|w| {
            w.write_object_array(1, &schema, Some(&[Some(point(1, 2))][..]), false)
        });
        // Array#1, element tag, then the count
        bytes[5] = 2;
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        let err = root.read_object_array(&schema).unwrap_err();
        assert!(err.to_string().contains("declared 2 elements"));
    }

    #[test]
    fn read_value_by_declared_type() {
        let schema = points();
        let bytes = encode(|w| {
            w.write_array(1, Some(&Array::Short(vec![1, -1])))?;
            w.write_char(2, 'q')
        });
        let mut session = ReadSession::new(&bytes[..]);
        let mut root = session.reader();
        root.has_next_field().unwrap();
        assert_eq!(
            root.read_value(&schema, FieldType::array(TypeTag::Short)).unwrap(),
            Some(Value::Array(Array::Short(vec![1, -1])))
        );
        root.has_next_field().unwrap();
        assert_eq!(
            root.read_value(&schema, FieldType::CHAR).unwrap(),
            Some(Value::Char('q'))
        );
    }
}
