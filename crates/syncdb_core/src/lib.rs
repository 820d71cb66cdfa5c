//! # SyncDB Core
//!
//! The journaled record store behind every replicated collection.
//!
//! This crate provides:
//! - [`SyncTable`]: rows plus a `(id, lastModified)` journal, with local
//!   writes, last-writer-wins merges and whole-collection replacement
//! - A framed, checksummed journal log that is replayed on open
//! - A transaction queue serializing writers of one collection
//! - [`Clock`] injection for local write timestamps
//!
//! ## Example
//!
//! ```rust
//! use syncdb_core::SyncTable;
//! use syncdb_protocol::{Fields, Timestamp};
//!
//! let table = SyncTable::in_memory("apps");
//! let mut row = Fields::new();
//! row.insert("code".into(), "print('hi')".into());
//!
//! let ts = table.insert_one("app-1", row.clone()).unwrap();
//! assert_eq!(table.last_modified(), ts);
//!
//! // A remote write that is not newer is dropped.
//! assert!(!table.insert_if_recent("app-1", Timestamp::ZERO, row).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
pub mod dir;
mod error;
pub mod journal;
mod state;
mod table;
mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use dir::CollectionDir;
pub use error::{CoreError, CoreResult};
pub use state::{Record, Replay, TableState};
pub use table::{digest_changes, MergedReply, SyncAt, SyncTable};
pub use transaction::{TransactionQueue, WriteTransaction};
pub use types::TransactionId;
