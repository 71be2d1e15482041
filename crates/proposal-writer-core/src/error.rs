//! Error taxonomy shared by every component of the core.
//!
//! Empty search results and a review loop that ends with unresolved issues
//! are *not* errors: both are normal outcomes the caller branches on.

use thiserror::Error;

/// Errors surfaced by the store, retrieval, and generation components.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input from the caller: a broken chunk sequence, invalid
    /// document attributes, or bad filter arguments. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The embedding service failed. Retry policy belongs to the caller.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The content generation service failed. Retry policy belongs to the caller.
    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    /// The caller's deadline expired before any generated content existed.
    #[error("deadline exceeded before any content was generated")]
    DeadlineExceeded,

    /// The storage backend failed (I/O, SQL, lock poisoning).
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
