//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use syncdb_core::{digest_changes, TableState};

/// Collection inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Collection directory.
    pub path: String,
    /// Journal log size in bytes.
    pub journal_size: u64,
    /// Number of framed records in the log.
    pub frame_count: usize,
    /// Committed transactions replayed.
    pub committed_transactions: usize,
    /// Bytes of an incomplete frame at the tail.
    pub torn_bytes: u64,
    /// Number of live records.
    pub record_count: usize,
    /// Number of journal entries, live or tombstone.
    pub journal_entries: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Greatest `lastModified` in the journal.
    pub last_modified: u64,
    /// SHA-256 over the full snapshot.
    pub digest: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Replays the journal and collects statistics.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let scan = super::read_journal(path)?;
    let replay = TableState::replay(scan.records.iter().map(|(_, record)| record));
    let state = &replay.state;
    let snapshot: Vec<_> = state.changes().collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: scan.valid_len + scan.torn_bytes,
        frame_count: scan.records.len(),
        committed_transactions: replay.committed,
        torn_bytes: scan.torn_bytes,
        record_count: state.live_count(),
        journal_entries: state.journal_count(),
        tombstone_count: state.journal_count() - state.live_count(),
        last_modified: state.high_water().as_u64(),
        digest: digest_changes(&snapshot)?,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Collection: {}", result.path);
    println!();
    println!("Journal log:");
    println!("  Size:          {} bytes", result.journal_size);
    println!("  Frames:        {}", result.frame_count);
    println!("  Transactions:  {}", result.committed_transactions);
    if result.torn_bytes > 0 {
        println!("  Torn tail:     {} bytes", result.torn_bytes);
    }
    println!();
    println!("Contents:");
    println!("  Records:       {}", result.record_count);
    println!("  Tombstones:    {}", result.tombstone_count);
    println!("  Last modified: {}", result.last_modified);
    println!("  Digest:        {}", result.digest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_collection;
    use syncdb_core::{StoreConfig, SyncTable};
    use tempfile::tempdir;

    #[test]
    fn inspect_counts_entries() {
        let temp = tempdir().unwrap();
        let path = sample_collection(temp.path());

        let result = inspect(&path).unwrap();
        assert_eq!(result.record_count, 1);
        assert_eq!(result.tombstone_count, 1);
        assert_eq!(result.journal_entries, 2);
        assert_eq!(result.committed_transactions, 3);
        assert_eq!(result.last_modified, 30);
        assert_eq!(result.torn_bytes, 0);

        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        assert_eq!(result.digest, table.digest().unwrap());
    }

    #[test]
    fn inspect_missing_collection_fails() {
        let temp = tempdir().unwrap();
        assert!(inspect(&temp.path().join("nope")).is_err());
    }
}
