//! # SyncDB Storage
//!
//! Append-only byte stores that hold a collection's journal log.
//!
//! Backends do not interpret what they store. The record store in
//! `syncdb_core` frames its transactions into records and replays them
//! on open; the backend only has to append, read back, and make data
//! durable.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Ephemeral replicas and tests
//! - [`FileBackend`] - One file per collection journal
//!
//! ## Example
//!
//! ```rust
//! use syncdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"journal frame").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"journal");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::{FaultSwitch, InMemoryBackend};
