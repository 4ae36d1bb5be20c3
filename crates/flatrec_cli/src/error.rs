//! CLI error type.

use flatrec_codec::CodecError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file does not hold the expected JSON.
    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A JSON record does not fit the schema.
    #[error("invalid record: {0}")]
    Record(String),

    /// The codec refused a schema or a buffer.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A report could not be rendered as JSON.
    #[error("could not render JSON: {0}")]
    Render(#[from] serde_json::Error),

    /// The verifier rejected the buffer.
    #[error("verification failed: {0}")]
    VerificationFailed(CodecError),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn record(message: impl Into<String>) -> Self {
        Self::Record(message.into())
    }
}
