//! Error types for the data-io protocol.

use std::io;

/// Crate-wide result alias.
pub type Result<T, E = DataError> = std::result::Result<T, E>;

/// Errors that can occur while writing or reading a data-io stream.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Malformed input or a violated protocol constraint. The byte cursor can
    /// no longer be trusted, so the session is unusable afterwards.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A transmitted field does not fit the local schema.
    #[error("schema mismatch on {type_name}.{field}: {reason}")]
    SchemaMismatch {
        type_name: String,
        field: String,
        reason: String,
    },

    /// The schema provider knows nothing about a type name.
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DataError {
    /// Builds a protocol error from anything displayable.
    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    pub fn mismatch(
        type_name: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            type_name: type_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns whether this error invalidates the stream it occurred on.
    ///
    /// Schema mismatches are absorbed by the reader (the field is skipped);
    /// everything else is surfaced and poisons the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SchemaMismatch { .. })
    }

    /// Maps a read-side I/O error, reporting truncation as a protocol error.
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Protocol("unexpected end of data".into())
        } else {
            Self::Io(e)
        }
    }
}
