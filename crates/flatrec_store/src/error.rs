//! Error types for the object store.

use flatrec_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Every variant maps to a stable numeric code, see [`StoreError::code`].
/// Looking up something that does not exist is `Ok(None)` or `Ok(false)`,
/// never an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation is not allowed in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was wrong.
        message: String,
    },

    /// An argument was out of range or referred to something unknown.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// What was wrong.
        message: String,
    },

    /// Memory for a result could not be reserved.
    #[error("allocation failed: {message}")]
    Allocation {
        /// Allocator message.
        message: String,
    },

    /// The configured database size limit would be exceeded.
    #[error("database full: {size} bytes exceeds the limit of {max} bytes")]
    DbFull {
        /// Size the database would have reached.
        size: u64,
        /// Configured limit.
        max: u64,
    },

    /// Too many read transactions are open.
    #[error("maximum number of readers ({max}) exceeded")]
    MaxReadersExceeded {
        /// Configured limit.
        max: u32,
    },

    /// The store hit an unrecoverable condition and must be closed.
    #[error("store must shut down: {message}")]
    StoreMustShutdown {
        /// What happened.
        message: String,
    },

    /// An insert hit an existing id.
    #[error("unique constraint violated: {entity} with id {id} already exists")]
    UniqueViolated {
        /// Entity type name.
        entity: String,
        /// The conflicting id.
        id: u64,
    },

    /// A query expected at most one result.
    #[error("query returned {count} results where at most one was expected")]
    NonUniqueResult {
        /// Number of matches.
        count: u64,
    },

    /// A property was used in a way its type does not support.
    #[error("property type mismatch on {property}: expected {expected}, found {actual}")]
    PropertyTypeMismatch {
        /// Property name.
        property: String,
        /// What the operation needs.
        expected: String,
        /// What the schema declares.
        actual: String,
    },

    /// Data violates a constraint other than uniqueness.
    #[error("constraint violated: {message}")]
    ConstraintViolated {
        /// What was violated.
        message: String,
    },

    /// The model or a buffer does not fit the schema.
    #[error("schema error: {message}")]
    Schema {
        /// What did not fit.
        message: String,
    },

    /// Stored or supplied bytes are damaged.
    #[error("file corrupt: {message}")]
    FileCorrupt {
        /// What was damaged.
        message: String,
    },

    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Code for [`StoreError::IllegalState`].
    pub const CODE_ILLEGAL_STATE: i32 = 10001;
    /// Code for [`StoreError::IllegalArgument`].
    pub const CODE_ILLEGAL_ARGUMENT: i32 = 10002;
    /// Code for [`StoreError::Allocation`].
    pub const CODE_ALLOCATION: i32 = 10003;
    /// Code for [`StoreError::DbFull`].
    pub const CODE_DB_FULL: i32 = 10101;
    /// Code for [`StoreError::MaxReadersExceeded`].
    pub const CODE_MAX_READERS_EXCEEDED: i32 = 10102;
    /// Code for [`StoreError::StoreMustShutdown`].
    pub const CODE_STORE_MUST_SHUTDOWN: i32 = 10103;
    /// Code for [`StoreError::Io`].
    pub const CODE_STORAGE_GENERAL: i32 = 10199;
    /// Code for [`StoreError::UniqueViolated`].
    pub const CODE_UNIQUE_VIOLATED: i32 = 10201;
    /// Code for [`StoreError::NonUniqueResult`].
    pub const CODE_NON_UNIQUE_RESULT: i32 = 10202;
    /// Code for [`StoreError::PropertyTypeMismatch`].
    pub const CODE_PROPERTY_TYPE_MISMATCH: i32 = 10203;
    /// Code for [`StoreError::ConstraintViolated`].
    pub const CODE_CONSTRAINT_VIOLATED: i32 = 10299;
    /// Code for [`StoreError::Schema`].
    pub const CODE_SCHEMA: i32 = 10501;
    /// Code for [`StoreError::FileCorrupt`].
    pub const CODE_FILE_CORRUPT: i32 = 10502;

    /// Numeric error code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::IllegalState { .. } => Self::CODE_ILLEGAL_STATE,
            Self::IllegalArgument { .. } => Self::CODE_ILLEGAL_ARGUMENT,
            Self::Allocation { .. } => Self::CODE_ALLOCATION,
            Self::DbFull { .. } => Self::CODE_DB_FULL,
            Self::MaxReadersExceeded { .. } => Self::CODE_MAX_READERS_EXCEEDED,
            Self::StoreMustShutdown { .. } => Self::CODE_STORE_MUST_SHUTDOWN,
            Self::UniqueViolated { .. } => Self::CODE_UNIQUE_VIOLATED,
            Self::NonUniqueResult { .. } => Self::CODE_NON_UNIQUE_RESULT,
            Self::PropertyTypeMismatch { .. } => Self::CODE_PROPERTY_TYPE_MISMATCH,
            Self::ConstraintViolated { .. } => Self::CODE_CONSTRAINT_VIOLATED,
            Self::Schema { .. } => Self::CODE_SCHEMA,
            Self::FileCorrupt { .. } => Self::CODE_FILE_CORRUPT,
            Self::Io(_) => Self::CODE_STORAGE_GENERAL,
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Creates an allocation error.
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation {
            message: message.into(),
        }
    }

    /// Creates a store-must-shutdown error.
    pub fn must_shutdown(message: impl Into<String>) -> Self {
        Self::StoreMustShutdown {
            message: message.into(),
        }
    }

    /// Creates a property type mismatch error.
    pub fn type_mismatch(
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::PropertyTypeMismatch {
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a file corruption error.
    pub fn file_corrupt(message: impl Into<String>) -> Self {
        Self::FileCorrupt {
            message: message.into(),
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::CorruptBuffer { .. } | CodecError::InvalidUtf8 { .. } => {
                Self::file_corrupt(err.to_string())
            }
            CodecError::SchemaMismatch { .. } | CodecError::InvalidSchema { .. } => {
                Self::schema(err.to_string())
            }
            CodecError::MissingRequiredField { .. } => Self::ConstraintViolated {
                message: err.to_string(),
            },
            CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            } => Self::DbFull {
                size: claimed,
                max: max_allowed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(StoreError::illegal_state("x").code(), 10001);
        assert_eq!(StoreError::illegal_argument("x").code(), 10002);
        assert_eq!(StoreError::DbFull { size: 2, max: 1 }.code(), 10101);
        assert_eq!(StoreError::MaxReadersExceeded { max: 1 }.code(), 10102);
        assert_eq!(StoreError::NonUniqueResult { count: 2 }.code(), 10202);
        assert_eq!(StoreError::type_mismatch("a", "string", "u8").code(), 10203);
        assert_eq!(StoreError::file_corrupt("x").code(), 10502);
    }

    #[test]
    fn codec_errors_map_by_class() {
        let err: StoreError = CodecError::corrupt("bad offset").into();
        assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT);

        let err: StoreError = CodecError::invalid_utf8("name").into();
        assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT);

        let err: StoreError = CodecError::schema_mismatch("wrong identifier").into();
        assert_eq!(err.code(), StoreError::CODE_SCHEMA);

        let err: StoreError = CodecError::missing_required("Person", "name").into();
        assert_eq!(err.code(), StoreError::CODE_CONSTRAINT_VIOLATED);

        let err: StoreError = CodecError::SizeLimitExceeded {
            claimed: 10,
            max_allowed: 5,
        }
        .into();
        assert!(matches!(err, StoreError::DbFull { size: 10, max: 5 }));
    }

    #[test]
    fn display_mentions_details() {
        let err = StoreError::UniqueViolated {
            entity: "Note".into(),
            id: 7,
        };
        assert!(err.to_string().contains("Note"));
        assert!(err.to_string().contains('7'));
    }
}
