//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Suitable for ephemeral replicas and tests. A [`FaultSwitch`] obtained
/// from [`InMemoryBackend::fault_switch`] makes every later write fail
/// with [`StorageError::Unavailable`], which is how tests provoke
/// storage faults in the layers above.
///
/// # Example
///
/// ```rust
/// use syncdb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
    failing: Arc<AtomicBool>,
}

/// Shared handle that toggles write failures on an [`InMemoryBackend`].
#[derive(Debug, Clone)]
pub struct FaultSwitch {
    failing: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Lets writes succeed again.
    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`, e.g. a journal captured
    /// from another backend to simulate a restart.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            failing: Arc::default(),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns a switch that can make writes to this backend fail.
    #[must_use]
    pub fn fault_switch(&self) -> FaultSwitch {
        FaultSwitch {
            failing: Arc::clone(&self.failing),
        }
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_writable()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_writable()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        *self.data.write() = new_data.to_vec();
        Ok(())
    }
}
