//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or reading tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A field marked required was never added before `end_table`.
    #[error("missing required field {field} in table {table}")]
    MissingRequiredField {
        /// Name of the table being built.
        table: String,
        /// Name of the missing field.
        field: String,
    },

    /// The value or buffer does not match the schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// An offset or length points outside the buffer.
    #[error("corrupt buffer: {message}")]
    CorruptBuffer {
        /// Description of the structural problem.
        message: String,
    },

    /// A string field does not hold valid UTF-8.
    #[error("invalid UTF-8 in string field {field}")]
    InvalidUtf8 {
        /// Name of the offending field.
        field: String,
    },

    /// The buffer would exceed the addressable size.
    #[error("size limit exceeded: {claimed} bytes (max {max_allowed})")]
    SizeLimitExceeded {
        /// Size that was requested.
        claimed: u64,
        /// Maximum size allowed.
        max_allowed: u64,
    },

    /// A schema descriptor is malformed.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Create a missing required field error.
    pub fn missing_required(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create a corrupt buffer error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptBuffer {
            message: message.into(),
        }
    }

    /// Create an invalid UTF-8 error.
    pub fn invalid_utf8(field: impl Into<String>) -> Self {
        Self::InvalidUtf8 {
            field: field.into(),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Returns true if the error describes a structurally damaged buffer.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptBuffer { .. } | Self::InvalidUtf8 { .. })
    }
}
