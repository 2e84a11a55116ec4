//! Error types for the vector store engine.
//!
//! Every fallible operation returns a [`Result`] rather than panicking or
//! aborting. The taxonomy mirrors the status codes a caller across an FFI
//! boundary would see: each variant maps to exactly one of those codes via
//! [`Error::code`].

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vector store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was invalid (zero dimension, out-of-range
    /// `top_k`, malformed path, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A filesystem operation failed.
    #[error("file I/O error: {0}")]
    FileIo(#[from] std::io::Error),

    /// The database file does not exist.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// No vector with the given identifier exists.
    #[error("vector not found: {0}")]
    VectorNotFound(u64),

    /// A vector's dimension did not match the database's configured
    /// dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the database.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// The on-disk or in-memory index structure failed an integrity check.
    #[error("database corrupt: {0}")]
    DatabaseCorrupt(String),
}

impl Error {
    /// Returns a short machine-checkable code for this error, matching the
    /// status codes a C caller across an FFI boundary would observe.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::OutOfMemory => "out-of-memory",
            Self::FileIo(_) => "file-io",
            Self::DatabaseNotFound(_) => "database-not-found",
            Self::VectorNotFound(_) => "vector-not-found",
            Self::DimensionMismatch { .. } => "dimension-mismatch",
            Self::DatabaseCorrupt(_) => "database-corrupt",
        }
    }

    /// Returns true if a caller can reasonably retry after this error
    /// without intervening repair. `DatabaseCorrupt` is the only
    /// non-recoverable variant: every mutation and search is blocked until
    /// `repair` clears it.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::DatabaseCorrupt(_))
    }
}
