//! The journaled record store of one collection.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::dir::CollectionDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::JournalLog;
use crate::state::{Record, TableState};
use crate::transaction::{TransactionQueue, WriteTransaction};
use crate::types::TransactionId;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use syncdb_protocol::conflict::{self, Resolution};
use syncdb_protocol::{
    is_reserved_field, reads_as_tombstone, Fields, RecordChange, RowState, Timestamp,
};
use syncdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tracing::{debug, info, warn};

/// Outcome of [`SyncTable::sync_at`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAt {
    /// One flag per pushed change: whether it was applied.
    pub applied: Vec<bool>,
    /// Local changes after the requested cursor.
    pub changes: Vec<RecordChange>,
    /// Local high-water-mark after applying the pushed changes.
    pub last_modified: Timestamp,
}

/// Outcome of [`SyncTable::merge_reply`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergedReply {
    /// One flag per change: whether it was applied.
    pub applied: Vec<bool>,
    /// High-water-mark after the batch, if nothing raised it between the
    /// caller's mark and this batch.
    pub quiet_high_water: Option<Timestamp>,
}

/// Rows plus journal of one collection, with last-writer-wins merge.
///
/// All mutations go through the table's transaction queue, so each call
/// is atomic and concurrent callers are serialized. Reads see committed
/// state only.
pub struct SyncTable {
    name: String,
    config: StoreConfig,
    queue: TransactionQueue,
    clock: Arc<dyn Clock>,
    _dir: Option<CollectionDir>,
}

impl SyncTable {
    /// Opens a table over `backend`, replaying its journal log.
    ///
    /// A torn tail left by a crash is cut off. Corruption fails the open.
    pub fn open(
        name: impl Into<String>,
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let name = name.into();
        let log = JournalLog::new(backend, config.sync_on_commit);
        let scan = log.scan()?;

        if scan.torn_bytes > 0 {
            warn!(
                collection = %name,
                torn_bytes = scan.torn_bytes,
                valid_len = scan.valid_len,
                "cutting off torn journal tail"
            );
            log.truncate(scan.valid_len)?;
        }

        let replay = TableState::replay(scan.records.iter().map(|(_, r)| r));
        info!(
            collection = %name,
            committed = replay.committed,
            discarded = replay.discarded,
            records = replay.state.live_count(),
            last_modified = replay.state.high_water().as_u64(),
            "collection opened"
        );

        Ok(Self {
            name,
            config,
            queue: TransactionQueue::new(log, replay.state, replay.next_txid),
            clock: Arc::new(SystemClock),
            _dir: None,
        })
    }

    /// Opens a durable table in `path`, holding the directory lock while
    /// the table lives.
    pub fn open_dir(name: impl Into<String>, path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = CollectionDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut table = Self::open(name, Box::new(backend), config)?;
        table._dir = Some(dir);
        Ok(table)
    }

    /// Creates an empty table that lives in memory.
    #[must_use]
    pub fn in_memory(name: impl Into<String>) -> Self {
        let config = StoreConfig::default().with_sync_on_commit(false);
        let log = JournalLog::new(Box::new(InMemoryBackend::new()), false);
        Self {
            name: name.into(),
            config,
            queue: TransactionQueue::new(log, TableState::default(), TransactionId::new(1)),
            clock: Arc::new(SystemClock),
            _dir: None,
        }
    }

    /// Replaces the clock used for local write timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All live records, ordered by id.
    #[must_use]
    pub fn get_all(&self) -> Vec<Record> {
        self.queue
            .read()
            .records()
            .map(|(id, fields)| Record {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect()
    }

    /// The live record with `id`, or `None`.
    #[must_use]
    pub fn get_one(&self, id: &str) -> Option<Fields> {
        self.queue.read().row(id).cloned()
    }

    /// Journal entries newer than `cursor` joined with their rows,
    /// ordered by timestamp then id.
    #[must_use]
    pub fn get_changes_after(&self, cursor: Timestamp) -> Vec<RecordChange> {
        let mut changes: Vec<RecordChange> = self
            .queue
            .read()
            .changes()
            .filter(|c| c.last_modified > cursor)
            .collect();
        changes.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        changes
    }

    /// Every journal entry joined with its row, ordered by id.
    ///
    /// Taken under the read lock, so concurrent snapshots do not exclude
    /// each other.
    #[must_use]
    pub fn get_raw(&self) -> Vec<RecordChange> {
        self.queue.read().changes().collect()
    }

    /// Greatest journal timestamp, or zero when the journal is empty.
    #[must_use]
    pub fn last_modified(&self) -> Timestamp {
        self.queue.read().high_water()
    }

    /// Journal timestamp of `id`.
    #[must_use]
    pub fn journal_entry(&self, id: &str) -> Option<Timestamp> {
        self.queue.read().journal_entry(id)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.read().live_count()
    }

    /// Returns true if there are no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of journal entries, tombstones included.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.queue.read().journal_count()
    }

    /// SHA-256 over the `get_raw()` projection, hex encoded.
    ///
    /// Two replicas with equal digests hold identical rows and journals.
    pub fn digest(&self) -> CoreResult<String> {
        digest_changes(&self.get_raw())
    }

    /// Size of the journal log in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.queue.log().size()
    }

    // ========================================================================
    // Local writes
    // ========================================================================

    /// Upserts a record with a fresh local timestamp.
    ///
    /// The timestamp is `max(now, floor + 1)`, where the floor is the
    /// collection's high-water-mark. Returns it.
    pub fn insert_one(&self, id: &str, fields: Fields) -> CoreResult<Timestamp> {
        validate_id(id)?;
        self.validate_local_row(&fields)?;

        self.queue.run(|txn| {
            let ts = conflict::local_timestamp(self.clock.now(), local_floor(txn, id));
            txn.put(id, ts, fields);
            Ok(ts)
        })
    }

    /// Deletes a record with a fresh local timestamp, leaving a tombstone.
    ///
    /// Returns the tombstone's timestamp.
    pub fn delete_one(&self, id: &str) -> CoreResult<Timestamp> {
        validate_id(id)?;

        self.queue.run(|txn| {
            let ts = conflict::local_timestamp(self.clock.now(), local_floor(txn, id));
            txn.delete(id, ts);
            Ok(ts)
        })
    }

    // ========================================================================
    // Remote merges
    // ========================================================================

    /// Upserts a record if `last_modified` is newer than the stored entry.
    pub fn insert_if_recent(
        &self,
        id: &str,
        last_modified: Timestamp,
        fields: Fields,
    ) -> CoreResult<bool> {
        let change = RecordChange::live(id, last_modified, fields);
        self.queue.run(|txn| self.merge(txn, &change))
    }

    /// Deletes a record if `last_modified` is newer than the stored entry.
    pub fn delete_if_recent(&self, id: &str, last_modified: Timestamp) -> CoreResult<bool> {
        let change = RecordChange::tombstone(id, last_modified);
        self.queue.run(|txn| self.merge(txn, &change))
    }

    /// Merges a batch of remote changes in one transaction.
    ///
    /// Returns one flag per change. If any change is malformed or the
    /// store fails, nothing from the batch is applied.
    pub fn handle_changes(&self, changes: &[RecordChange]) -> CoreResult<Vec<bool>> {
        self.queue.run(|txn| {
            changes
                .iter()
                .map(|change| self.merge(txn, change))
                .collect()
        })
    }

    /// Merges a sync reply like [`handle_changes`](Self::handle_changes).
    ///
    /// `mark` is the high-water-mark read when the request was built. If
    /// the collection is still at `mark` when the batch runs, every entry
    /// up to the new high-water-mark was either sent with the request or
    /// came from this reply, and that mark is reported.
    pub fn merge_reply(&self, changes: &[RecordChange], mark: Timestamp) -> CoreResult<MergedReply> {
        self.queue.run(|txn| {
            let quiet = txn.high_water() == mark;
            let applied = changes
                .iter()
                .map(|change| self.merge(txn, change))
                .collect::<CoreResult<Vec<_>>>()?;
            Ok(MergedReply {
                applied,
                quiet_high_water: quiet.then(|| txn.high_water()),
            })
        })
    }

    /// Merges `pushed`, then reads local changes after `since` and the
    /// high-water-mark, all in one transaction.
    pub fn sync_at(&self, since: Timestamp, pushed: &[RecordChange]) -> CoreResult<SyncAt> {
        self.queue.run(|txn| {
            let applied = pushed
                .iter()
                .map(|change| self.merge(txn, change))
                .collect::<CoreResult<Vec<_>>>()?;
            Ok(SyncAt {
                applied,
                changes: txn.changes_after(since),
                last_modified: txn.high_water(),
            })
        })
    }

    /// Overwrites rows and journal with `entries`.
    ///
    /// Duplicate ids are reduced to the entry with the greatest timestamp,
    /// later position winning ties. Tombstones become journal entries.
    pub fn replace_all(&self, entries: Vec<RecordChange>) -> CoreResult<()> {
        let projected = conflict::project(entries);
        for change in &projected {
            validate_change(change)?;
        }

        let count = projected.len();
        self.queue.run(|txn| {
            txn.reset();
            for change in projected {
                match change.state {
                    RowState::Live(fields) => txn.put(&change.id, change.last_modified, fields),
                    RowState::Tombstone => txn.delete(&change.id, change.last_modified),
                }
            }
            Ok(())
        })?;

        info!(collection = %self.name, entries = count, "collection replaced");
        Ok(())
    }

    /// Rewrites the journal log as a single snapshot transaction.
    pub fn compact(&self) -> CoreResult<()> {
        self.queue.compact()
    }

    fn merge(&self, txn: &mut WriteTransaction<'_>, change: &RecordChange) -> CoreResult<bool> {
        validate_change(change)?;

        match conflict::resolve(txn.journal_entry(&change.id), change.last_modified) {
            Resolution::Stale => {
                debug!(
                    collection = %self.name,
                    id = %change.id,
                    last_modified = change.last_modified.as_u64(),
                    "stale change dropped"
                );
                Ok(false)
            }
            Resolution::Apply => {
                match &change.state {
                    RowState::Live(fields) => {
                        txn.put(&change.id, change.last_modified, fields.clone());
                    }
                    RowState::Tombstone => txn.delete(&change.id, change.last_modified),
                }
                Ok(true)
            }
        }
    }

    fn validate_local_row(&self, fields: &Fields) -> CoreResult<()> {
        if reads_as_tombstone(fields) {
            return Err(CoreError::invalid_input(
                "a row needs at least one non-null field",
            ));
        }
        validate_field_names(fields)?;
        if let Some(name) = fields.keys().find(|name| !self.config.allows_field(name)) {
            return Err(CoreError::invalid_input(format!(
                "field '{name}' is not declared for collection '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTable")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_input("record id must not be empty"));
    }
    Ok(())
}

fn validate_field_names(fields: &Fields) -> CoreResult<()> {
    match fields.keys().find(|name| is_reserved_field(name)) {
        Some(name) => Err(CoreError::invalid_input(format!(
            "'{name}' is reserved and cannot name a field"
        ))),
        None => Ok(()),
    }
}

fn validate_change(change: &RecordChange) -> CoreResult<()> {
    validate_id(&change.id)?;
    if let RowState::Live(fields) = &change.state {
        if reads_as_tombstone(fields) {
            return Err(CoreError::invalid_input(format!(
                "change for '{}' carries a row without values",
                change.id
            )));
        }
        validate_field_names(fields)?;
    }
    Ok(())
}

/// SHA-256 over the JSON encoding of each change, one per line, hex
/// encoded.
pub fn digest_changes(changes: &[RecordChange]) -> CoreResult<String> {
    let mut hasher = Sha256::new();
    for change in changes {
        let line = serde_json::to_vec(change).map_err(|e| CoreError::codec(e.to_string()))?;
        hasher.update(&line);
        hasher.update(b"\n");
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Newest timestamp a local write to `id` has to beat: the collection's
/// high-water-mark, or the id's own entry while that mark is still zero.
fn local_floor(txn: &WriteTransaction<'_>, id: &str) -> Option<Timestamp> {
    let high_water = txn.high_water();
    if high_water > Timestamp::ZERO {
        Some(high_water)
    } else {
        txn.journal_entry(id)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use syncdb_storage::FaultSwitch;

    fn fields(v: i64) -> Fields {
        let mut f = Fields::new();
        f.insert("v".into(), json!(v));
        f
    }

    fn table_at(millis: u64) -> (SyncTable, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(millis));
        let table = SyncTable::in_memory("apps").with_clock(clock.clone());
        (table, clock)
    }

    fn faulty_table() -> (SyncTable, FaultSwitch) {
        let backend = InMemoryBackend::new();
        let faults = backend.fault_switch();
        let table = SyncTable::open("apps", Box::new(backend), StoreConfig::default()).unwrap();
        (table, faults)
    }

    #[test]
    fn insert_and_read_back() {
        let (table, _) = table_at(100);
        let ts = table.insert_one("x", fields(1)).unwrap();

        assert_eq!(ts, Timestamp::new(100));
        assert_eq!(table.get_one("x"), Some(fields(1)));
        assert_eq!(table.journal_entry("x"), Some(ts));
        assert_eq!(table.last_modified(), ts);
        assert_eq!(table.get_all().len(), 1);
    }

    #[test]
    fn delete_leaves_tombstone() {
        let (table, clock) = table_at(100);
        table.insert_one("x", fields(1)).unwrap();
        clock.set(120);
        let ts = table.delete_one("x").unwrap();

        assert_eq!(ts, Timestamp::new(120));
        assert_eq!(table.get_one("x"), None);
        assert!(table.is_empty());
        assert_eq!(table.journal_len(), 1);
        assert_eq!(table.get_raw(), vec![RecordChange::tombstone("x", 120)]);
    }

    #[test]
    fn lagging_clock_still_moves_entry_forward() {
        let (table, clock) = table_at(100);
        table.insert_one("x", fields(1)).unwrap();
        clock.set(40);

        let ts = table.insert_one("x", fields(2)).unwrap();
        assert_eq!(ts, Timestamp::new(101));
        let ts = table.delete_one("x").unwrap();
        assert_eq!(ts, Timestamp::new(102));
    }

    #[test]
    fn local_write_sorts_after_merged_remote_writes() {
        let (table, _) = table_at(50);
        assert!(table.insert_if_recent("remote", Timestamp::new(100), fields(1)).unwrap());

        let ts = table.insert_one("local", fields(2)).unwrap();
        assert_eq!(ts, Timestamp::new(101));
        assert_eq!(table.last_modified(), ts);
        assert_eq!(table.get_changes_after(Timestamp::new(100)).len(), 1);
    }

    #[test]
    fn local_insert_validation() {
        let table = SyncTable::in_memory("apps");
        let mut nulls = Fields::new();
        nulls.insert("v".into(), json!(null));

        assert!(matches!(
            table.insert_one("", fields(1)),
            Err(CoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            table.insert_one("x", Fields::new()),
            Err(CoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            table.insert_one("x", nulls),
            Err(CoreError::InvalidInput { .. })
        ));
        assert_eq!(table.journal_len(), 0);
    }

    #[test]
    fn change_keys_cannot_name_fields() {
        let table = SyncTable::in_memory("apps");
        let mut shadowed = fields(1);
        shadowed.insert("id".into(), json!("other"));

        assert!(matches!(
            table.insert_one("x", shadowed.clone()),
            Err(CoreError::InvalidInput { .. })
        ));

        let mut stamped = fields(1);
        stamped.insert("lastModified".into(), json!(1));
        let batch = [
            RecordChange::live("a", 5u64, fields(1)),
            RecordChange::live("x", 5u64, stamped),
        ];
        assert!(table.handle_changes(&batch).is_err());
        assert!(table.insert_if_recent("x", Timestamp::new(5), shadowed).is_err());
        assert_eq!(table.journal_len(), 0);
    }

    #[test]
    fn declared_fields_restrict_local_inserts() {
        let table = SyncTable::open(
            "devices",
            Box::new(InMemoryBackend::new()),
            StoreConfig::new().with_fields(["kind"]),
        )
        .unwrap();

        let mut row = Fields::new();
        row.insert("owner".into(), json!("bob"));
        assert!(table.insert_one("d1", row.clone()).is_err());

        // Remote changes are accepted as sent.
        assert!(table
            .insert_if_recent("d1", Timestamp::new(5), row)
            .unwrap());
    }

    #[test]
    fn stale_remote_writes_are_dropped() {
        let table = SyncTable::in_memory("apps");
        assert!(table
            .insert_if_recent("y", Timestamp::new(60), fields(6))
            .unwrap());

        assert!(!table
            .insert_if_recent("y", Timestamp::new(50), fields(5))
            .unwrap());
        assert!(!table
            .insert_if_recent("y", Timestamp::new(60), fields(7))
            .unwrap());
        assert!(!table.delete_if_recent("y", Timestamp::new(60)).unwrap());

        assert_eq!(table.get_one("y"), Some(fields(6)));
        assert_eq!(table.journal_entry("y"), Some(Timestamp::new(60)));
    }

    #[test]
    fn newer_remote_delete_applies() {
        let table = SyncTable::in_memory("apps");
        table
            .insert_if_recent("y", Timestamp::new(60), fields(6))
            .unwrap();
        assert!(table.delete_if_recent("y", Timestamp::new(61)).unwrap());
        assert_eq!(table.get_one("y"), None);
    }

    #[test]
    fn unseen_id_always_applies() {
        let table = SyncTable::in_memory("apps");
        assert!(table.delete_if_recent("ghost", Timestamp::ZERO).unwrap());
        assert_eq!(table.journal_entry("ghost"), Some(Timestamp::ZERO));
    }

    #[test]
    fn changes_after_are_ordered_by_time() {
        let table = SyncTable::in_memory("apps");
        table
            .handle_changes(&[
                RecordChange::live("b", 30, fields(2)),
                RecordChange::live("a", 10, fields(1)),
                RecordChange::tombstone("c", 20),
            ])
            .unwrap();

        let ids: Vec<_> = table
            .get_changes_after(Timestamp::new(10))
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(table.get_changes_after(Timestamp::new(30)).is_empty());
    }

    #[test]
    fn handle_changes_is_all_or_nothing() {
        let table = SyncTable::in_memory("apps");
        table
            .insert_if_recent("a", Timestamp::new(10), fields(1))
            .unwrap();

        let flags = table
            .handle_changes(&[
                RecordChange::live("a", 5, fields(0)),
                RecordChange::live("b", 5, fields(2)),
            ])
            .unwrap();
        assert_eq!(flags, vec![false, true]);

        let result = table.handle_changes(&[
            RecordChange::live("c", 50, fields(3)),
            RecordChange::live("", 51, fields(4)),
        ]);
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
        assert_eq!(table.get_one("c"), None);
    }

    #[test]
    fn later_duplicate_in_batch_sees_earlier() {
        let table = SyncTable::in_memory("apps");
        let flags = table
            .handle_changes(&[
                RecordChange::live("a", 20, fields(2)),
                RecordChange::live("a", 10, fields(1)),
            ])
            .unwrap();
        assert_eq!(flags, vec![true, false]);
        assert_eq!(table.get_one("a"), Some(fields(2)));
    }

    #[test]
    fn sync_at_applies_then_reads() {
        let table = SyncTable::in_memory("apps");
        table
            .insert_if_recent("y", Timestamp::new(60), fields(60))
            .unwrap();

        let result = table
            .sync_at(
                Timestamp::new(40),
                &[
                    RecordChange::live("y", 50, fields(50)),
                    RecordChange::live("z", 55, fields(55)),
                ],
            )
            .unwrap();

        assert_eq!(result.applied, vec![false, true]);
        assert_eq!(result.last_modified, Timestamp::new(60));
        assert_eq!(
            result.changes,
            vec![
                RecordChange::live("z", 55, fields(55)),
                RecordChange::live("y", 60, fields(60)),
            ]
        );
        assert_eq!(table.get_one("y"), Some(fields(60)));
    }

    #[test]
    fn replace_all_projects_duplicates() {
        let (table, _) = table_at(500);
        table.insert_one("old", fields(0)).unwrap();

        table
            .replace_all(vec![
                RecordChange::live("a", 10, fields(1)),
                RecordChange::live("a", 10, fields(2)),
                RecordChange::tombstone("b", 7),
                RecordChange::live("b", 3, fields(3)),
            ])
            .unwrap();

        assert_eq!(
            table.get_raw(),
            vec![
                RecordChange::live("a", 10, fields(2)),
                RecordChange::tombstone("b", 7),
            ]
        );
        assert_eq!(table.last_modified(), Timestamp::new(10));
        assert_eq!(table.get_one("old"), None);
    }

    #[test]
    fn replace_all_rejects_empty_id() {
        let table = SyncTable::in_memory("apps");
        table
            .insert_if_recent("keep", Timestamp::new(1), fields(1))
            .unwrap();
        assert!(table
            .replace_all(vec![RecordChange::live("", 3, fields(3))])
            .is_err());
        assert_eq!(table.get_one("keep"), Some(fields(1)));
    }

    #[test]
    fn storage_fault_propagates_and_keeps_state() {
        let (table, faults) = faulty_table();
        table
            .insert_if_recent("a", Timestamp::new(1), fields(1))
            .unwrap();

        faults.fail_writes();
        let err = table.insert_one("b", fields(2)).unwrap_err();
        assert!(err.is_storage_fault());
        assert!(table.handle_changes(&[RecordChange::tombstone("a", 9)]).is_err());
        assert_eq!(table.get_one("a"), Some(fields(1)));
        assert_eq!(table.get_one("b"), None);
    }

    #[test]
    fn digest_tracks_content() {
        let a = SyncTable::in_memory("apps");
        let b = SyncTable::in_memory("apps");
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        a.insert_if_recent("x", Timestamp::new(1), fields(1)).unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());

        b.insert_if_recent("x", Timestamp::new(1), fields(1)).unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn reopen_replays_committed_state() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("apps");

        let digest = {
            let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
            table.insert_one("x", fields(1)).unwrap();
            table.insert_one("y", fields(2)).unwrap();
            table.delete_one("x").unwrap();
            table.digest().unwrap()
        };

        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        assert_eq!(table.digest().unwrap(), digest);
        assert_eq!(table.get_one("y"), Some(fields(2)));
        assert!(table.journal_entry("x").is_some());
    }

    #[test]
    fn torn_tail_is_cut_on_open() {
        use std::io::Write;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("apps");
        let good = {
            let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
            table
                .insert_if_recent("a", Timestamp::new(1), fields(1))
                .unwrap();
            table.journal_size().unwrap()
        };

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(crate::dir::journal_path(&path))
            .unwrap();
        file.write_all(b"SJNL\x01\x00\x02").unwrap();
        drop(file);

        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        assert_eq!(table.journal_size().unwrap(), good);
        assert_eq!(table.get_one("a"), Some(fields(1)));
    }

    #[test]
    fn compact_then_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("apps");
        let digest = {
            let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
            for v in 0..10u64 {
                table
                    .insert_if_recent("a", Timestamp::new(v + 1), fields(v as i64))
                    .unwrap();
            }
            table.delete_if_recent("b", Timestamp::new(3)).unwrap();
            let before = table.journal_size().unwrap();
            table.compact().unwrap();
            assert!(table.journal_size().unwrap() < before);
            table.digest().unwrap()
        };

        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        assert_eq!(table.digest().unwrap(), digest);
    }
}
