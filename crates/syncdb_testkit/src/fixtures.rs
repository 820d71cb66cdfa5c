//! Test fixtures and collection helpers.
//!
//! Provides convenience functions for setting up test collections
//! and building rows.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syncdb_core::{Clock, ManualClock, StoreConfig, SyncTable};
use syncdb_protocol::Fields;
use syncdb_storage::{FaultSwitch, InMemoryBackend};
use tempfile::TempDir;

/// A durable test collection with automatic cleanup.
pub struct TestCollection {
    /// The table.
    pub table: SyncTable,
    /// Kept alive to prevent cleanup.
    temp_dir: TempDir,
    name: String,
}

impl TestCollection {
    /// Creates a file-backed collection in a fresh temporary directory.
    pub fn file(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let table = SyncTable::open_dir(name, &temp_dir.path().join(name), StoreConfig::default())
            .expect("Failed to open collection");
        Self {
            table,
            temp_dir,
            name: name.to_string(),
        }
    }

    /// Returns the collection directory.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join(&self.name)
    }

    /// Closes and reopens the collection, replaying its journal.
    pub fn reopen(self) -> Self {
        let Self {
            table,
            temp_dir,
            name,
        } = self;
        drop(table);
        let table = SyncTable::open_dir(&name, &temp_dir.path().join(&name), StoreConfig::default())
            .expect("Failed to reopen collection");
        Self {
            table,
            temp_dir,
            name,
        }
    }

    /// Returns the temporary root directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl std::ops::Deref for TestCollection {
    type Target = SyncTable;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

/// Runs a test with a temporary file-backed collection.
pub fn with_temp_collection<F, R>(f: F) -> R
where
    F: FnOnce(&SyncTable) -> R,
{
    let collection = TestCollection::file("test");
    f(&collection)
}

/// Creates an in-memory table whose journal writes can be made to fail.
pub fn faulty_table(name: &str, clock: Arc<dyn Clock>) -> (SyncTable, FaultSwitch) {
    let backend = InMemoryBackend::new();
    let faults = backend.fault_switch();
    let table = SyncTable::open(
        name,
        Box::new(backend),
        StoreConfig::default().with_sync_on_commit(false),
    )
    .expect("Failed to open in-memory table")
    .with_clock(clock);
    (table, faults)
}

/// Creates an in-memory table with a manual clock starting at `now`.
pub fn clocked_table(name: &str, now: u64) -> (SyncTable, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let table = SyncTable::in_memory(name).with_clock(clock.clone());
    (table, clock)
}

/// A one-field row `{v: value}`.
pub fn row(value: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("v".into(), Value::from(value));
    fields
}

/// Builds a row from a JSON object.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn row_from(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        other => panic!("row must be a JSON object, got {other}"),
    }
}
