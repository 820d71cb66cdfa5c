//! Conflict recovery.
//!
//! When a batch of remote changes fails to merge (storage fault, malformed
//! payload) the replica does not try to repair the batch. It escalates to a
//! destructive whole-collection resynchronization against the authority:
//!
//! - a non-authority sends `force-sync` to the authority and later adopts
//!   the `force-sync-data` snapshot via `replace_all`;
//! - the authority sends `do-force-sync` to the offending peer, which then
//!   starts the first path itself.
//!
//! The authority never adopts another replica's state, so recovery always
//! terminates at the authority's snapshot.

use crate::config::SyncConfig;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use syncdb_protocol::SyncMessage;

/// What a replica sends after a failed merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryAction {
    /// Peer to send to.
    pub peer: String,
    /// Either `force-sync` or `do-force-sync`.
    pub message: SyncMessage,
}

impl RecoveryAction {
    /// Returns true if this action asks for a snapshot.
    pub fn is_force_sync(&self) -> bool {
        matches!(self.message, SyncMessage::ForceSync)
    }
}

/// Decides the recovery step after a merge of changes from `offender`
/// failed.
pub fn plan(config: &SyncConfig, offender: &str) -> RecoveryAction {
    if config.is_authority() {
        RecoveryAction {
            peer: offender.to_string(),
            message: SyncMessage::DoForceSync,
        }
    } else {
        RecoveryAction {
            peer: config.authority.clone(),
            message: SyncMessage::ForceSync,
        }
    }
}

/// Peers with an outstanding `force-sync` request.
///
/// A snapshot is only adopted from a peer listed here.
#[derive(Debug, Default)]
pub struct RecoveryTracker {
    pending: Mutex<BTreeSet<String>>,
}

impl RecoveryTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a request to `peer` as outstanding. Returns false if one
    /// already was.
    pub fn begin(&self, peer: &str) -> bool {
        self.pending.lock().insert(peer.to_string())
    }

    /// Clears the outstanding request to `peer`. Returns false if there
    /// was none.
    pub fn complete(&self, peer: &str) -> bool {
        self.pending.lock().remove(peer)
    }

    /// Returns true if a request to `peer` is outstanding.
    pub fn is_pending(&self, peer: &str) -> bool {
        self.pending.lock().contains(peer)
    }

    /// Returns the number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
