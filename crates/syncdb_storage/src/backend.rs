//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level, append-only byte store holding one journal log.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` pushes appended data to the medium, `sync` makes it durable
/// - `replace` swaps the whole content in one step; readers never see a
///   half-written replacement
/// - Backends must be `Send + Sync` so a table can be shared across threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage and returns its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes pending writes to the underlying medium.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used to cut off a torn tail left by a crash mid-append.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the entire content with `data`.
    ///
    /// The default implementation truncates and re-appends, which is not
    /// crash-atomic. File-backed stores override it with write-and-rename.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }

    /// Reads the entire content.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("storage of {size} bytes does not fit in memory"),
            )
        })?;
        self.read_at(0, len)
    }
}
