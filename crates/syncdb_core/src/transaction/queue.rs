//! Transaction queue.

use crate::error::CoreResult;
use crate::journal::{JournalLog, JournalRecord};
use crate::state::TableState;
use crate::transaction::write::WriteTransaction;
use crate::types::TransactionId;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Serializes writers of one collection.
///
/// The queue provides:
/// - Single-writer concurrency via `begin_write()`; later writers block on
///   the write lock in arrival order
/// - Readers that only observe committed state
/// - Journal-first durability: a commit is appended to the log before it
///   is applied in memory
///
/// A transaction that fails or is dropped is rolled back by discarding
/// its staged writes; the lock passes to the next writer.
pub struct TransactionQueue {
    log: JournalLog,
    state: RwLock<TableState>,
    next_txid: AtomicU64,
    write_lock: Mutex<()>,
}

impl TransactionQueue {
    /// Creates a queue over a log whose content is already reflected in
    /// `state`.
    pub fn new(log: JournalLog, state: TableState, next_txid: TransactionId) -> Self {
        Self {
            log,
            state: RwLock::new(state),
            next_txid: AtomicU64::new(next_txid.as_u64()),
            write_lock: Mutex::new(()),
        }
    }

    /// Begins a write transaction, waiting for the current writer.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let guard = self.write_lock.lock();
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        WriteTransaction::new(txid, &self.state, guard)
    }

    /// Commits a write transaction.
    ///
    /// The staged writes are appended to the journal log as one unit and
    /// then applied to the committed state. If the append fails nothing is
    /// applied.
    pub fn commit(&self, txn: WriteTransaction<'_>) -> CoreResult<()> {
        let (txid, writes, _guard) = txn.into_parts();
        if writes.is_empty() {
            return Ok(());
        }

        let mut records = Vec::with_capacity(writes.len() + 2);
        records.push(JournalRecord::Begin { txid });
        records.extend(writes);
        records.push(JournalRecord::Commit { txid });

        if let Err(err) = self.log.append_transaction(&records) {
            warn!(%txid, error = %err, "journal append failed, transaction rolled back");
            return Err(err);
        }

        let mut state = self.state.write();
        for record in &records {
            state.apply(record);
        }
        debug!(%txid, writes = records.len() - 2, "transaction committed");
        Ok(())
    }

    /// Runs `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err`.
    pub fn run<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        let mut txn = self.begin_write();
        match f(&mut txn) {
            Ok(value) => {
                self.commit(txn)?;
                Ok(value)
            }
            Err(err) => {
                debug!(txid = %txn.id(), error = %err, "transaction rolled back");
                drop(txn);
                Err(err)
            }
        }
    }

    /// Returns a read guard over the committed state.
    ///
    /// Readers do not exclude each other; a commit waits for them.
    pub fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read()
    }

    /// Rewrites the journal log as one transaction holding the committed
    /// state.
    pub fn compact(&self) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));

        let state = self.state.read();
        let mut records = Vec::with_capacity(state.journal_count() + 3);
        records.push(JournalRecord::Begin { txid });
        records.push(JournalRecord::Reset { txid });
        for change in state.changes() {
            records.push(match change.state.into_fields() {
                Some(fields) => JournalRecord::Put {
                    txid,
                    id: change.id,
                    last_modified: change.last_modified,
                    fields,
                },
                None => JournalRecord::Delete {
                    txid,
                    id: change.id,
                    last_modified: change.last_modified,
                },
            });
        }
        records.push(JournalRecord::Commit { txid });
        drop(state);

        self.log.rewrite(&records)?;
        debug!(%txid, records = records.len(), "journal compacted");
        Ok(())
    }

    /// Returns the journal log.
    #[must_use]
    pub fn log(&self) -> &JournalLog {
        &self.log
    }
}

impl std::fmt::Debug for TransactionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionQueue")
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
