//! Collection directory management.
//!
//! Each durable collection lives in its own directory:
//!
//! ```text
//! <collection_path>/
//! ├─ LOCK              # Advisory lock, one owner per collection
//! └─ journal.log       # Framed journal log
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// Holds the exclusive lock on a collection directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct CollectionDir {
    path: PathBuf,
    _lock_file: File,
}

impl CollectionDir {
    /// Opens or creates a collection directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`CollectionLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("collection directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_input(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::CollectionLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the collection directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the journal log.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}

/// Returns the journal log path inside a collection directory without
/// locking it.
#[must_use]
pub fn journal_path(collection_path: &Path) -> PathBuf {
    collection_path.join(JOURNAL_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("apps");

        let dir = CollectionDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.journal_path(), path.join("journal.log"));
        assert_eq!(journal_path(&path), dir.journal_path());
    }

    #[test]
    fn open_fails_if_missing_and_no_create() {
        let temp = tempdir().unwrap();
        let result = CollectionDir::open(&temp.path().join("nope"), false);
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("devices");

        let _first = CollectionDir::open(&path, true).unwrap();
        let second = CollectionDir::open(&path, true);
        assert!(matches!(second, Err(CoreError::CollectionLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("transcripts");

        {
            let _dir = CollectionDir::open(&path, true).unwrap();
        }
        let _again = CollectionDir::open(&path, true).unwrap();
    }
}
