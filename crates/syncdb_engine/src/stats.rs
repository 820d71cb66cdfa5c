//! Sync statistics.

/// Counters kept by a [`SyncDatabase`](crate::SyncDatabase).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// `change` messages broadcast after local writes.
    pub changes_broadcast: u64,
    /// Remote changes applied.
    pub changes_applied: u64,
    /// Remote changes dropped as stale.
    pub changes_stale: u64,
    /// Sync rounds started by this replica.
    pub sync_rounds: u64,
    /// Force syncs requested by this replica.
    pub force_syncs: u64,
    /// Snapshots adopted via `replace_all`.
    pub recoveries: u64,
    /// Last error seen while handling a remote message.
    pub last_error: Option<String>,
}

impl SyncStats {
    pub(crate) fn record_applied(&mut self, applied: &[bool]) {
        let count = applied.iter().filter(|a| **a).count() as u64;
        self.changes_applied += count;
        self.changes_stale += applied.len() as u64 - count;
    }
}
