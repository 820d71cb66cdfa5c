//! Export command implementation.

use std::fs;
use std::path::Path;
use syncdb_core::TableState;
use syncdb_protocol::RecordChange;

/// Runs the export command.
pub fn run(path: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = snapshot(path)?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(out) => {
            fs::write(out, json)?;
            eprintln!("Exported {} entries to {:?}", snapshot.len(), out);
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Every journal entry joined with its row, tombstones included.
///
/// This is the same list a replica sends in answer to a force-sync.
pub fn snapshot(path: &Path) -> Result<Vec<RecordChange>, Box<dyn std::error::Error>> {
    let scan = super::read_journal(path)?;
    let replay = TableState::replay(scan.records.iter().map(|(_, record)| record));
    Ok(replay.state.changes().collect())
}
