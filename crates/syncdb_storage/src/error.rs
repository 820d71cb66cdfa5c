//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to truncate to a size larger than the stored data.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncatePastEnd {
        /// Requested new size.
        requested: u64,
        /// The current storage size.
        size: u64,
    },

    /// The backend has been marked unavailable.
    #[error("storage is unavailable")]
    Unavailable,
}

impl StorageError {
    /// Returns true if the error is a failure of the underlying medium
    /// rather than a misuse of the API.
    pub fn is_io(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Unavailable)
    }
}
