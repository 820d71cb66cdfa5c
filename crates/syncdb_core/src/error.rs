//! Error types for the SyncDB record store.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] syncdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Journal log is corrupted or has an unsupported format.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in a journal frame.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the frame.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Failed to encode or decode a journal payload.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// A write was rejected before touching the store.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Why the input was rejected.
        message: String,
    },

    /// Another process holds the collection directory.
    #[error("collection locked: another process has exclusive access")]
    CollectionLocked,
}

impl CoreError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Returns true if the error comes from the underlying store rather
    /// than from the data handed to it.
    #[must_use]
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Io(_) | Self::CollectionLocked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncdb_storage::StorageError;

    #[test]
    fn storage_faults_are_classified() {
        assert!(CoreError::from(StorageError::Unavailable).is_storage_fault());
        assert!(CoreError::from(io::Error::other("disk gone")).is_storage_fault());
        assert!(!CoreError::invalid_input("empty id").is_storage_fault());
        assert!(!CoreError::journal_corruption("bad magic").is_storage_fault());
    }

    #[test]
    fn messages_carry_context() {
        let err = CoreError::ChecksumMismatch {
            offset: 64,
            expected: 0xdead_beef,
            actual: 0x0bad_f00d,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch at offset 64: expected deadbeef, got 0badf00d"
        );
    }
}
