//! Per-peer sync cursors.
//!
//! Two cursors are kept per `(collection, peer)`:
//!
//! - the pull cursor, the newest `lastModified` already incorporated from
//!   the peer, on the peer's clock: `syncdb-time-<collection>-<peer>`;
//! - the push cursor, the local high-water-mark covered by the last
//!   completed round, on the local clock: `syncdb-push-<collection>-<peer>`.
//!
//! Cursors live outside the collection so they survive a `replace_all` and
//! process restarts. `%` and `-` inside a name are percent-escaped, so the
//! `-` separating collection from peer is unambiguous.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use syncdb_protocol::Timestamp;

const CURSOR_KEY_PREFIX: &str = "syncdb-time-";
const PUSH_CURSOR_KEY_PREFIX: &str = "syncdb-push-";

/// Returns the pull cursor key for a `(collection, peer)` pair.
#[must_use]
pub fn cursor_key(collection: &str, peer: &str) -> String {
    compose_key(CURSOR_KEY_PREFIX, collection, peer)
}

/// Returns the push cursor key for a `(collection, peer)` pair.
#[must_use]
pub fn push_cursor_key(collection: &str, peer: &str) -> String {
    compose_key(PUSH_CURSOR_KEY_PREFIX, collection, peer)
}

fn compose_key(prefix: &str, collection: &str, peer: &str) -> String {
    format!("{prefix}{}-{}", escape(collection), escape(peer))
}

fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            '-' => out.push_str("%2D"),
            _ => out.push(c),
        }
    }
    out
}

/// Key-value capability holding one cursor per `(collection, peer)`.
pub trait CursorStore: Send + Sync {
    /// Returns the stored cursor, if any.
    fn get(&self, key: &str) -> SyncResult<Option<Timestamp>>;

    /// Stores a cursor.
    fn set(&self, key: &str, cursor: Timestamp) -> SyncResult<()>;
}

/// Cursor store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, Timestamp>>,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored cursors.
    pub fn len(&self) -> usize {
        self.cursors.lock().len()
    }

    /// Returns true if no cursor is stored.
    pub fn is_empty(&self) -> bool {
        self.cursors.lock().is_empty()
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, key: &str) -> SyncResult<Option<Timestamp>> {
        Ok(self.cursors.lock().get(key).copied())
    }

    fn set(&self, key: &str, cursor: Timestamp) -> SyncResult<()> {
        self.cursors.lock().insert(key.to_string(), cursor);
        Ok(())
    }
}

/// Cursor store persisted as a JSON object in a single file.
///
/// Every `set` rewrites the file through a temporary file and a rename,
/// so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, u64>>,
}

impl FileCursorStore {
    /// Opens the store at `path`, loading existing cursors.
    ///
    /// A missing file is treated as an empty store.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cursors = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::cursor_store(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SyncError::cursor_store(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            cursors: Mutex::new(cursors),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cursors: &BTreeMap<String, u64>) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(cursors)
            .map_err(|e| SyncError::cursor_store(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| SyncError::cursor_store(format!("{}: {e}", self.path.display())))
    }
}

impl CursorStore for FileCursorStore {
    fn get(&self, key: &str) -> SyncResult<Option<Timestamp>> {
        Ok(self.cursors.lock().get(key).copied().map(Timestamp))
    }

    fn set(&self, key: &str, cursor: Timestamp) -> SyncResult<()> {
        let mut cursors = self.cursors.lock();
        let previous = cursors.insert(key.to_string(), cursor.as_u64());
        if let Err(err) = self.persist(&cursors) {
            match previous {
                Some(old) => cursors.insert(key.to_string(), old),
                None => cursors.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }
}
