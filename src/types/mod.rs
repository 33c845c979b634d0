//! data-io value types.

mod value;

pub use value::{Array, FieldType, Value};
