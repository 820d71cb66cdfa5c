//! Committed in-memory state of a collection.

use crate::journal::JournalRecord;
use crate::types::TransactionId;
use std::collections::{BTreeMap, HashSet};
use syncdb_protocol::{Fields, RecordChange, RowState, Timestamp};
use tracing::{debug, warn};

/// A live record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record id.
    pub id: String,
    /// Record fields.
    pub fields: Fields,
}

/// Rows plus the journal describing them.
///
/// Every row has a journal entry; a journal entry without a row is a
/// tombstone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableState {
    rows: BTreeMap<String, Fields>,
    journal: BTreeMap<String, Timestamp>,
    high_water: Timestamp,
}

impl TableState {
    /// Returns the fields of a live record.
    #[must_use]
    pub fn row(&self, id: &str) -> Option<&Fields> {
        self.rows.get(id)
    }

    /// Returns the journal timestamp of an id.
    #[must_use]
    pub fn journal_entry(&self, id: &str) -> Option<Timestamp> {
        self.journal.get(id).copied()
    }

    /// Returns the greatest journal timestamp, or zero when empty.
    #[must_use]
    pub fn high_water(&self) -> Timestamp {
        self.high_water
    }

    /// Number of live records.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of journal entries, tombstones included.
    #[must_use]
    pub fn journal_count(&self) -> usize {
        self.journal.len()
    }

    /// Live records ordered by id.
    pub fn records(&self) -> impl Iterator<Item = (&String, &Fields)> {
        self.rows.iter()
    }

    /// Joins a journal entry with its row.
    #[must_use]
    pub fn change(&self, id: &str) -> Option<RecordChange> {
        let last_modified = self.journal_entry(id)?;
        Some(RecordChange {
            id: id.to_string(),
            last_modified,
            state: RowState::from(self.rows.get(id).cloned()),
        })
    }

    /// Every journal entry joined with its row, ordered by id.
    pub fn changes(&self) -> impl Iterator<Item = RecordChange> + '_ {
        self.journal.iter().map(|(id, ts)| RecordChange {
            id: id.clone(),
            last_modified: *ts,
            state: RowState::from(self.rows.get(id).cloned()),
        })
    }

    /// Applies a data record. `Begin` and `Commit` are no-ops.
    pub fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Put {
                id,
                last_modified,
                fields,
                ..
            } => {
                self.rows.insert(id.clone(), fields.clone());
                self.journal.insert(id.clone(), *last_modified);
                self.high_water = self.high_water.max(*last_modified);
            }
            JournalRecord::Delete {
                id, last_modified, ..
            } => {
                self.rows.remove(id);
                self.journal.insert(id.clone(), *last_modified);
                self.high_water = self.high_water.max(*last_modified);
            }
            JournalRecord::Reset { .. } => {
                self.rows.clear();
                self.journal.clear();
                self.high_water = Timestamp::ZERO;
            }
            JournalRecord::Begin { .. } | JournalRecord::Commit { .. } => {}
        }
    }

    /// Rebuilds state from scanned log records.
    ///
    /// Data records are buffered per transaction and applied when the
    /// transaction's `Commit` is seen.
    pub fn replay<'a>(records: impl IntoIterator<Item = &'a JournalRecord>) -> Replay {
        let mut state = TableState::default();
        let mut pending: BTreeMap<TransactionId, Vec<&'a JournalRecord>> = BTreeMap::new();
        let mut committed = HashSet::new();
        let mut max_txid = 0;

        for record in records {
            let txid = record.txid();
            max_txid = max_txid.max(txid.as_u64());
            match record {
                JournalRecord::Begin { .. } => {
                    pending.entry(txid).or_default();
                }
                JournalRecord::Commit { .. } => {
                    for data in pending.remove(&txid).unwrap_or_default() {
                        state.apply(data);
                    }
                    committed.insert(txid);
                }
                _ => match pending.get_mut(&txid) {
                    Some(buffer) => buffer.push(record),
                    None => warn!(%txid, "journal record outside a transaction ignored"),
                },
            }
        }

        if !pending.is_empty() {
            debug!(
                count = pending.len(),
                "discarding uncommitted transactions"
            );
        }

        Replay {
            state,
            next_txid: TransactionId::new(max_txid + 1),
            committed: committed.len(),
            discarded: pending.len(),
        }
    }
}

/// Outcome of [`TableState::replay`].
#[derive(Debug)]
pub struct Replay {
    /// Rebuilt state.
    pub state: TableState,
    /// First transaction ID that is free to use.
    pub next_txid: TransactionId,
    /// Transactions applied.
    pub committed: usize,
    /// Transactions discarded for lack of a commit.
    pub discarded: usize,
}
