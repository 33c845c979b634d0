//! Session configuration.

use crate::error::DataError;

/// Field id of the class-metadata block inside an encoded object.
pub const CLASS_META_FIELD: u16 = 1;

/// Field id of the class-id reference inside an encoded object.
pub const CLASS_ID_FIELD: u16 = 2;

/// Settings shared by every writer or reader of one session.
///
/// ```
/// use dataio::Config;
///
/// let config = Config::default().base_field_id(10).max_depth(16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) base_field_id: u16,
    pub(crate) compress_names: bool,
    pub(crate) max_depth: usize,
    pub(crate) max_length: usize,
    pub(crate) flush_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_field_id: 3,
            compress_names: true,
            max_depth: 64,
            max_length: 64 * 1024 * 1024,
            flush_threshold: 8 * 1024,
        }
    }
}

impl Config {
    /// Sets the id given to the first declared field of every type.
    pub fn base_field_id(mut self, id: u16) -> Self {
        self.base_field_id = id;
        self
    }

    /// Enables or disables prefix compression of type names.
    pub fn compress_names(mut self, enabled: bool) -> Self {
        self.compress_names = enabled;
        self
    }

    /// Sets the deepest object nesting accepted on either side.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the largest string or array length accepted from the wire.
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = len;
        self
    }

    /// Sets how many encoded bytes the writer buffers before hitting the sink.
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.base_field_id <= CLASS_ID_FIELD {
            return Err(DataError::Protocol(format!(
                "base field id {} collides with reserved ids 1 and 2",
                self.base_field_id
            )));
        }
        if self.max_depth == 0 {
            return Err(DataError::protocol("max depth must be at least 1"));
        }
        Ok(())
    }
}
