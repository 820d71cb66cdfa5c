//! Write transaction with staged writes.

use crate::journal::JournalRecord;
use crate::state::TableState;
use crate::types::TransactionId;
use parking_lot::{MutexGuard, RwLock};
use std::collections::BTreeMap;
use syncdb_protocol::{Fields, RecordChange, RowState, Timestamp};

/// A staged write as seen by reads inside the transaction.
#[derive(Debug, Clone)]
struct Staged {
    last_modified: Timestamp,
    row: Option<Fields>,
}

/// An open write transaction.
///
/// Holds the table's write lock for its whole lifetime. Writes are staged
/// and become visible to other readers only when the queue commits them;
/// dropping the transaction rolls it back.
pub struct WriteTransaction<'a> {
    txid: TransactionId,
    committed: &'a RwLock<TableState>,
    writes: Vec<JournalRecord>,
    overlay: BTreeMap<String, Staged>,
    reset: bool,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(
        txid: TransactionId,
        committed: &'a RwLock<TableState>,
        guard: MutexGuard<'a, ()>,
    ) -> Self {
        Self {
            txid,
            committed,
            writes: Vec::new(),
            overlay: BTreeMap::new(),
            reset: false,
            _guard: guard,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.txid
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Journal timestamp of `id` including staged writes.
    #[must_use]
    pub fn journal_entry(&self, id: &str) -> Option<Timestamp> {
        if let Some(staged) = self.overlay.get(id) {
            return Some(staged.last_modified);
        }
        if self.reset {
            return None;
        }
        self.committed.read().journal_entry(id)
    }

    /// Greatest journal timestamp including staged writes.
    #[must_use]
    pub fn high_water(&self) -> Timestamp {
        let staged = self
            .overlay
            .values()
            .map(|s| s.last_modified)
            .max()
            .unwrap_or(Timestamp::ZERO);
        if self.reset {
            staged
        } else {
            staged.max(self.committed.read().high_water())
        }
    }

    /// Journal entries after `cursor` including staged writes, ordered by
    /// timestamp then id.
    #[must_use]
    pub fn changes_after(&self, cursor: Timestamp) -> Vec<RecordChange> {
        let mut changes: Vec<RecordChange> = self
            .overlay
            .iter()
            .filter(|(_, s)| s.last_modified > cursor)
            .map(|(id, s)| RecordChange {
                id: id.clone(),
                last_modified: s.last_modified,
                state: RowState::from(s.row.clone()),
            })
            .collect();

        if !self.reset {
            let committed = self.committed.read();
            changes.extend(
                committed
                    .changes()
                    .filter(|c| c.last_modified > cursor && !self.overlay.contains_key(&c.id)),
            );
        }

        changes.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        changes
    }

    /// Stages an upsert.
    pub fn put(&mut self, id: &str, last_modified: Timestamp, fields: Fields) {
        self.overlay.insert(
            id.to_string(),
            Staged {
                last_modified,
                row: Some(fields.clone()),
            },
        );
        self.writes.push(JournalRecord::Put {
            txid: self.txid,
            id: id.to_string(),
            last_modified,
            fields,
        });
    }

    /// Stages a delete.
    pub fn delete(&mut self, id: &str, last_modified: Timestamp) {
        self.overlay.insert(
            id.to_string(),
            Staged {
                last_modified,
                row: None,
            },
        );
        self.writes.push(JournalRecord::Delete {
            txid: self.txid,
            id: id.to_string(),
            last_modified,
        });
    }

    /// Stages the removal of every row and journal entry.
    ///
    /// Discards writes staged before it.
    pub fn reset(&mut self) {
        self.overlay.clear();
        self.writes.clear();
        self.reset = true;
        self.writes.push(JournalRecord::Reset { txid: self.txid });
    }

    /// Splits into the staged writes and the write lock, which the caller
    /// keeps until the writes are applied.
    pub(crate) fn into_parts(self) -> (TransactionId, Vec<JournalRecord>, MutexGuard<'a, ()>) {
        (self.txid, self.writes, self._guard)
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("txid", &self.txid)
            .field("writes", &self.writes.len())
            .field("reset", &self.reset)
            .finish_non_exhaustive()
    }
}
