//! CLI command implementations.

pub mod compact;
pub mod dump_journal;
pub mod export;
pub mod inspect;
pub mod verify;

use std::path::Path;
use syncdb_core::dir::journal_path;
use syncdb_core::journal::{parse_frames, LogScan};

/// Reads and parses a collection's journal log without locking it.
pub(crate) fn read_journal(path: &Path) -> Result<LogScan, Box<dyn std::error::Error>> {
    let journal = journal_path(path);
    if !journal.exists() {
        return Err(format!("No collection found at {:?}", path).into());
    }
    let data = std::fs::read(&journal)?;
    Ok(parse_frames(&data)?)
}

/// Returns the collection name stored in a directory: its last path
/// component.
pub(crate) fn collection_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection".to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use syncdb_core::{StoreConfig, SyncTable};
    use syncdb_protocol::{Fields, Value};

    pub fn row(v: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("v".into(), Value::from(v));
        fields
    }

    /// Writes `a`, `b`, then deletes `a`, and returns the collection path.
    pub fn sample_collection(root: &Path) -> PathBuf {
        let path = root.join("apps");
        let table = SyncTable::open_dir("apps", &path, StoreConfig::default()).unwrap();
        table.insert_if_recent("a", 10u64.into(), row(1)).unwrap();
        table.insert_if_recent("b", 20u64.into(), row(2)).unwrap();
        table.delete_if_recent("a", 30u64.into()).unwrap();
        path
    }
}
