//! Compact command implementation.

use std::path::Path;
use syncdb_core::{StoreConfig, SyncTable};
use tracing::info;

/// Outcome of a compaction.
#[derive(Debug)]
pub struct CompactResult {
    /// Journal size before compaction.
    pub size_before: u64,
    /// Journal size after compaction (estimate on dry run).
    pub size_after: Option<u64>,
    /// Journal entries carried into the snapshot.
    pub entries: usize,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let result = compact(path, dry_run)?;

    if dry_run {
        println!("Dry run - no changes will be made");
        println!();
        println!("Journal size: {} bytes", result.size_before);
        println!("Entries:      {}", result.entries);
        println!();
        println!("Compaction would rewrite the log as a single snapshot transaction");
        return Ok(());
    }

    let after = result.size_after.unwrap_or(result.size_before);
    println!("Compacted {:?}", path);
    println!("  Entries:  {}", result.entries);
    println!("  Before:   {} bytes", result.size_before);
    println!("  After:    {} bytes", after);
    if result.size_before > 0 {
        let saved = result.size_before.saturating_sub(after);
        println!(
            "  Saved:    {} bytes ({:.1}%)",
            saved,
            saved as f64 / result.size_before as f64 * 100.0
        );
    }
    Ok(())
}

/// Compacts the collection at `path`, or only measures it when `dry_run`.
///
/// Takes the collection lock, so it fails while a replica has it open.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactResult, Box<dyn std::error::Error>> {
    if dry_run {
        let scan = super::read_journal(path)?;
        let replay = syncdb_core::TableState::replay(scan.records.iter().map(|(_, r)| r));
        return Ok(CompactResult {
            size_before: scan.valid_len + scan.torn_bytes,
            size_after: None,
            entries: replay.state.journal_count(),
        });
    }

    let name = super::collection_name(path);
    let config = StoreConfig::default().with_create_if_missing(false);
    let table = SyncTable::open_dir(name, path, config)?;

    let size_before = table.journal_size()?;
    table.compact()?;
    let size_after = table.journal_size()?;
    info!(
        path = %path.display(),
        size_before,
        size_after,
        "journal compacted"
    );

    Ok(CompactResult {
        size_before,
        size_after: Some(size_after),
        entries: table.journal_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_collection;
    use syncdb_protocol::Timestamp;
    use tempfile::tempdir;

    #[test]
    fn dry_run_leaves_log_alone() {
        let temp = tempdir().unwrap();
        let path = sample_collection(temp.path());
        let before = super::super::read_journal(&path).unwrap().valid_len;

        let result = compact(&path, true).unwrap();
        assert_eq!(result.size_before, before);
        assert_eq!(result.size_after, None);
        assert_eq!(result.entries, 2);
        assert_eq!(super::super::read_journal(&path).unwrap().valid_len, before);
    }

    #[test]
    fn compact_shrinks_and_keeps_entries() {
        let temp = tempdir().unwrap();
        let path = sample_collection(temp.path());

        let result = compact(&path, false).unwrap();
        let after = result.size_after.unwrap();
        assert!(after < result.size_before);
        assert_eq!(result.entries, 2);

        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        assert_eq!(table.journal_entry("a"), Some(Timestamp(30)));
        assert_eq!(table.journal_entry("b"), Some(Timestamp(20)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn compact_requires_existing_collection() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing");
        assert!(compact(&missing, false).is_err());
        assert!(!missing.exists());
    }
}
