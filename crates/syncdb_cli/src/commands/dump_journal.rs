//! Dump journal command implementation.

use serde::Serialize;
use std::path::Path;
use syncdb_core::journal::JournalRecord;

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct JournalRecordInfo {
    /// Offset in the journal log.
    pub offset: u64,
    /// Record type.
    pub record_type: &'static str,
    /// Transaction ID.
    pub txid: u64,
    /// Record id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Journal timestamp (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
    /// Row (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<syncdb_protocol::Fields>,
}

impl From<(u64, &JournalRecord)> for JournalRecordInfo {
    fn from((offset, record): (u64, &JournalRecord)) -> Self {
        let mut info = Self {
            offset,
            record_type: record.record_type().name(),
            txid: record.txid().as_u64(),
            id: None,
            last_modified: None,
            fields: None,
        };
        match record {
            JournalRecord::Put {
                id,
                last_modified,
                fields,
                ..
            } => {
                info.id = Some(id.clone());
                info.last_modified = Some(last_modified.as_u64());
                info.fields = Some(fields.clone());
            }
            JournalRecord::Delete {
                id, last_modified, ..
            } => {
                info.id = Some(id.clone());
                info.last_modified = Some(last_modified.as_u64());
            }
            JournalRecord::Begin { .. } | JournalRecord::Reset { .. } | JournalRecord::Commit { .. } => {}
        }
        info
    }
}

/// Runs the dump-journal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = read_records(path, start_offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Reads up to `limit` records at or after `start_offset`.
pub fn read_records(
    path: &Path,
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<JournalRecordInfo>, Box<dyn std::error::Error>> {
    let scan = super::read_journal(path)?;
    Ok(scan
        .records
        .iter()
        .filter(|(offset, _)| *offset >= start_offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, record)| JournalRecordInfo::from((*offset, record)))
        .collect())
}

fn print_text_output(records: &[JournalRecordInfo]) {
    if records.is_empty() {
        println!("No journal records found.");
        return;
    }

    println!("{:>10}  {:<7}  {:>6}  {:<24}  {:>14}", "OFFSET", "TYPE", "TXID", "ID", "LAST_MODIFIED");
    for record in records {
        println!(
            "{:>10}  {:<7}  {:>6}  {:<24}  {:>14}",
            record.offset,
            record.record_type,
            record.txid,
            record.id.as_deref().unwrap_or("-"),
            record
                .last_modified
                .map(|ts| ts.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!();
    println!("{} record(s)", records.len());
}
