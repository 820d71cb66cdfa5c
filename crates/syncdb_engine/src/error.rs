//! Error types for the sync coordinator.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The record store failed.
    #[error("storage error: {0}")]
    Storage(#[from] syncdb_core::CoreError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The peer is not connected.
    #[error("not connected to peer")]
    NotConnected,

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] syncdb_protocol::ProtocolError),

    /// The cursor store failed.
    #[error("cursor store error: {message}")]
    CursorStore {
        /// Error message.
        message: String,
    },

    /// A handler is already registered for a channel.
    #[error("channel already registered: {channel}")]
    DuplicateChannel {
        /// Channel name.
        channel: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a cursor store error.
    pub fn cursor_store(message: impl Into<String>) -> Self {
        Self::CursorStore {
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::Storage(err) => err.is_storage_fault(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncdb_core::CoreError;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("peer unreachable").is_retryable());
        assert!(!SyncError::transport_fatal("unknown peer").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::from(CoreError::invalid_input("empty id")).is_retryable());
        assert!(!SyncError::DuplicateChannel {
            channel: "syncdb-apps".into()
        }
        .is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::DuplicateChannel {
            channel: "syncdb-apps".into(),
        };
        assert_eq!(err.to_string(), "channel already registered: syncdb-apps");

        let err = SyncError::from(CoreError::invalid_input("record id must not be empty"));
        assert_eq!(
            err.to_string(),
            "storage error: invalid input: record id must not be empty"
        );
    }
}
