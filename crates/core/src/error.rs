//! Error types shared across the workspace.

use thiserror::Error;

/// Errors produced by stores and the copy engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("content already exists: {0}")]
    AlreadyExists(String),

    #[error("size mismatch for {digest}: declared {declared}, got {actual}")]
    SizeMismatch {
        digest: String,
        declared: u64,
        actual: u64,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned by a pre-copy hook to suppress the default transfer of a
    /// node the hook has already handled. Recovered by the copier, never
    /// surfaced to callers.
    #[error("descriptor skipped")]
    SkipDescriptor,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ferry operations.
pub type Result<T> = std::result::Result<T, Error>;
