//! Schema side of the protocol: the host binding, class descriptors and the
//! per-session registries that send each descriptor at most once.

pub mod descriptor;
pub mod dynamic;
pub mod names;
pub mod provider;
pub mod registry;

pub use descriptor::{ClassDescriptor, FieldDescriptor};
pub use dynamic::{DynamicObject, DynamicValue, SchemaTable};
pub use provider::{FieldSpec, SchemaProvider};
pub use registry::{ReadRegistry, WriteRegistry};
