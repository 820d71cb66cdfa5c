//! Last-writer-wins arbitration.
//!
//! Writes to the same id are ordered by their `lastModified` timestamp
//! alone. An incoming write is applied only when it is strictly newer
//! than the stored journal entry; equal timestamps keep the stored value.

use crate::change::{RecordChange, Timestamp};
use std::collections::BTreeMap;

/// Outcome of arbitrating an incoming write against the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming write is newer and replaces the stored state.
    Apply,
    /// The stored state is as new or newer; the incoming write is dropped.
    Stale,
}

impl Resolution {
    /// Returns true if the incoming write should be applied.
    #[must_use]
    pub fn is_apply(self) -> bool {
        matches!(self, Resolution::Apply)
    }
}

/// Arbitrates an incoming write against the stored journal timestamp.
#[must_use]
pub fn resolve(stored: Option<Timestamp>, incoming: Timestamp) -> Resolution {
    match stored {
        Some(stored) if incoming <= stored => Resolution::Stale,
        _ => Resolution::Apply,
    }
}

/// Timestamp for a local write given the clock reading and the newest
/// journal timestamp already in the collection.
///
/// Never returns a value at or below `floor`, so a lagging clock cannot
/// move an entry backwards and every local write sorts after everything
/// the replica has already seen.
#[must_use]
pub fn local_timestamp(now: Timestamp, floor: Option<Timestamp>) -> Timestamp {
    match floor {
        Some(floor) => now.max(floor.next()),
        None => now,
    }
}

/// Reduces a list of changes to one change per id.
///
/// The change with the greatest `lastModified` wins; among equal
/// timestamps the one appearing later in the input wins. The result is
/// ordered by id.
#[must_use]
pub fn project(changes: impl IntoIterator<Item = RecordChange>) -> Vec<RecordChange> {
    let mut winners: BTreeMap<String, RecordChange> = BTreeMap::new();
    for change in changes {
        match winners.get(&change.id) {
            Some(current) if current.last_modified > change.last_modified => {}
            _ => {
                winners.insert(change.id.clone(), change);
            }
        }
    }
    winners.into_values().collect()
}
