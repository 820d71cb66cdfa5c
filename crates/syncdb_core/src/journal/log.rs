//! Append-only journal log over a storage backend.

use crate::error::{CoreError, CoreResult};
use crate::journal::record::{
    compute_crc32, JournalRecord, JournalRecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};
use parking_lot::Mutex;
use syncdb_storage::{StorageBackend, StorageResult};
use tracing::{error, warn};

/// Result of scanning a journal log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogScan {
    /// Every complete frame with its offset.
    pub records: Vec<(u64, JournalRecord)>,
    /// Length of the prefix made of complete frames.
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to an incomplete frame.
    pub torn_bytes: u64,
}

/// Parses frames from raw log bytes.
///
/// An incomplete frame at the end (short header or short payload) ends the
/// scan and is reported in `torn_bytes`. A bad magic, unknown version,
/// unknown record type or checksum mismatch is an error.
pub fn parse_frames(data: &[u8]) -> CoreResult<LogScan> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        if rest[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "invalid magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported version {version} at offset {offset}"
            )));
        }
        let record_type = JournalRecordType::from_byte(rest[6]).ok_or_else(|| {
            CoreError::journal_corruption(format!(
                "unknown record type {} at offset {offset}",
                rest[6]
            ))
        })?;
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;

        let frame_len = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < frame_len {
            break;
        }

        let body = &rest[..HEADER_SIZE + len];
        let expected = u32::from_le_bytes([
            rest[HEADER_SIZE + len],
            rest[HEADER_SIZE + len + 1],
            rest[HEADER_SIZE + len + 2],
            rest[HEADER_SIZE + len + 3],
        ]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
        }

        let record = JournalRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        records.push((offset, record));
        pos += frame_len;
    }

    Ok(LogScan {
        records,
        valid_len: pos as u64,
        torn_bytes: (data.len() - pos) as u64,
    })
}

/// Writes and reads the framed journal log of one collection.
///
/// Each transaction is written with a single `append`, so a crash leaves
/// at most one incomplete transaction at the tail.
pub struct JournalLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl JournalLog {
    /// Creates a journal log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends the frames of one transaction.
    ///
    /// Returns the offset of the first frame. If the append, flush or sync
    /// fails, the log is cut back to its previous length so the
    /// transaction cannot reappear on replay.
    pub fn append_transaction(&self, records: &[JournalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&record.encode_frame()?);
        }

        let mut backend = self.backend.lock();
        let start = backend.size()?;
        match write_durably(&mut **backend, &data, self.sync_on_commit) {
            Ok(offset) => Ok(offset),
            Err(err) => {
                warn!(offset = start, error = %err, "journal append failed, cutting back");
                if let Err(cut) = backend.truncate(start) {
                    error!(offset = start, error = %cut, "journal not cut back after failed append");
                }
                Err(err.into())
            }
        }
    }

    /// Replaces the whole log with `records`.
    pub fn rewrite(&self, records: &[JournalRecord]) -> CoreResult<()> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&record.encode_frame()?);
        }
        self.backend.lock().replace(&data)?;
        Ok(())
    }

    /// Reads and parses the whole log.
    pub fn scan(&self) -> CoreResult<LogScan> {
        let data = self.backend.lock().read_all()?;
        parse_frames(&data)
    }

    /// Cuts the log back to `len` bytes.
    pub fn truncate(&self, len: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(len)?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

fn write_durably(
    backend: &mut dyn StorageBackend,
    data: &[u8],
    sync: bool,
) -> StorageResult<u64> {
    let offset = backend.append(data)?;
    backend.flush()?;
    if sync {
        backend.sync()?;
    }
    Ok(offset)
}

impl std::fmt::Debug for JournalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use syncdb_protocol::Timestamp;
    use syncdb_storage::{InMemoryBackend, StorageError};

    fn tx(txid: u64, id: &str, ts: u64) -> Vec<JournalRecord> {
        let txid = TransactionId::new(txid);
        vec![
            JournalRecord::Begin { txid },
            JournalRecord::Delete {
                txid,
                id: id.into(),
                last_modified: Timestamp::new(ts),
            },
            JournalRecord::Commit { txid },
        ]
    }

    #[test]
    fn append_and_scan() {
        let log = JournalLog::new(Box::new(InMemoryBackend::new()), false);
        log.append_transaction(&tx(1, "a", 10)).unwrap();
        let second = log.append_transaction(&tx(2, "b", 11)).unwrap();

        let scan = log.scan().unwrap();
        assert_eq!(scan.records.len(), 6);
        assert_eq!(scan.records[3].0, second);
        assert_eq!(scan.torn_bytes, 0);
        assert_eq!(scan.valid_len, log.size().unwrap());
    }

    #[test]
    fn empty_log_scans_clean() {
        let scan = parse_frames(&[]).unwrap();
        assert!(scan.records.is_empty());
        assert_eq!(scan.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_reported_not_fatal() {
        let mut data = Vec::new();
        for record in tx(1, "a", 10) {
            data.extend_from_slice(&record.encode_frame().unwrap());
        }
        let complete = data.len();
        let next = JournalRecord::Begin {
            txid: TransactionId::new(2),
        }
        .encode_frame()
        .unwrap();
        data.extend_from_slice(&next[..next.len() - 3]);

        let scan = parse_frames(&data).unwrap();
        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.valid_len, complete as u64);
        assert_eq!(scan.torn_bytes, (next.len() - 3) as u64);
    }

    #[test]
    fn short_header_is_torn() {
        let frame = JournalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_frame()
        .unwrap();
        let scan = parse_frames(&frame[..5]).unwrap();
        assert!(scan.records.is_empty());
        assert_eq!(scan.torn_bytes, 5);
    }

    #[test]
    fn flipped_bit_is_a_checksum_error() {
        let mut frame = JournalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_frame()
        .unwrap();
        frame[HEADER_SIZE] ^= 0x01;

        let err = parse_frames(&frame).unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { offset: 0, .. }));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut frame = JournalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_frame()
        .unwrap();
        frame[0] = b'X';
        assert!(matches!(
            parse_frames(&frame),
            Err(CoreError::JournalCorruption { .. })
        ));
    }

    #[test]
    fn rewrite_replaces_content() {
        let log = JournalLog::new(Box::new(InMemoryBackend::new()), true);
        log.append_transaction(&tx(1, "a", 10)).unwrap();
        log.append_transaction(&tx(2, "b", 11)).unwrap();

        log.rewrite(&tx(3, "c", 12)).unwrap();
        let scan = log.scan().unwrap();
        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.records[0].1.txid(), TransactionId::new(3));
    }

    /// Backend over shared bytes whose flush can be made to fail while
    /// appends and truncation keep working.
    #[derive(Clone, Default)]
    struct FlakyFlush {
        data: Arc<parking_lot::Mutex<Vec<u8>>>,
        fail_flush: Arc<AtomicBool>,
    }

    impl StorageBackend for FlakyFlush {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            let data = self.data.lock();
            let start = offset as usize;
            data.get(start..start + len)
                .map(<[u8]>::to_vec)
                .ok_or(StorageError::ReadPastEnd {
                    offset,
                    len,
                    size: data.len() as u64,
                })
        }

        fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
            let mut data = self.data.lock();
            let offset = data.len() as u64;
            data.extend_from_slice(bytes);
            Ok(offset)
        }

        fn flush(&mut self) -> StorageResult<()> {
            if self.fail_flush.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable);
            }
            Ok(())
        }

        fn size(&self) -> StorageResult<u64> {
            Ok(self.data.lock().len() as u64)
        }

        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.data.lock().truncate(new_size as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_flush_leaves_no_frames() {
        let backend = FlakyFlush::default();
        let log = JournalLog::new(Box::new(backend.clone()), true);
        log.append_transaction(&tx(1, "a", 10)).unwrap();
        let before = log.size().unwrap();

        backend.fail_flush.store(true, Ordering::SeqCst);
        assert!(log.append_transaction(&tx(2, "b", 20)).is_err());

        assert_eq!(log.size().unwrap(), before);
        let scan = log.scan().unwrap();
        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.torn_bytes, 0);
    }

    #[test]
    fn failed_insert_stays_gone_after_reopen() {
        use crate::config::StoreConfig;
        use crate::table::SyncTable;
        use syncdb_protocol::{Fields, Value};

        let mut row = Fields::new();
        row.insert("v".into(), Value::from(1));

        let backend = FlakyFlush::default();
        let table = SyncTable::open("apps", Box::new(backend.clone()), StoreConfig::default()).unwrap();
        backend.fail_flush.store(true, Ordering::SeqCst);
        assert!(table.insert_one("ghost", row).is_err());
        assert_eq!(table.get_one("ghost"), None);
        drop(table);

        backend.fail_flush.store(false, Ordering::SeqCst);
        let reopened = SyncTable::open("apps", Box::new(backend), StoreConfig::default()).unwrap();
        assert_eq!(reopened.get_one("ghost"), None);
        assert_eq!(reopened.journal_len(), 0);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = parse_frames(&data);
            }

            #[test]
            fn any_truncation_is_a_torn_tail(cut in 0usize..64) {
                let mut bytes = Vec::new();
                for record in tx(1, "a", 10) {
                    bytes.extend(record.encode_frame().unwrap());
                }
                let cut = cut.min(bytes.len());
                let scan = parse_frames(&bytes[..bytes.len() - cut]).unwrap();
                prop_assert_eq!(scan.valid_len + scan.torn_bytes, (bytes.len() - cut) as u64);
            }
        }
    }
}
