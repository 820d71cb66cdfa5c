//! # SyncDB Engine
//!
//! Per-collection sync coordinator for SyncDB.
//!
//! This crate provides:
//! - [`SyncDatabase`]: the replicated collection, speaking the protocol
//!   with peers and applying remote changes last-writer-wins
//! - Conflict recovery against a configured authority replica
//! - [`CursorStore`] implementations for per-peer sync cursors
//! - [`PeerTransport`] and [`MessageRouter`] seams to the outside world
//! - [`ChangeObserver`] notifications for applied remote changes
//!
//! ## Sync round
//!
//! ```text
//! client (phone)                         server (cloud)
//!   │  sync-request(cursor, own changes)   │
//!   │ ────────────────────────────────────▶│ apply pushed changes
//!   │                                      │ collect changes after cursor
//!   │  sync-reply(high-water, changes)     │
//!   │ ◀────────────────────────────────────│
//!   │ apply changes, store cursor          │
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use syncdb_core::SyncTable;
//! use syncdb_engine::{MemoryCursorStore, MockTransport, SyncConfig, SyncDatabase};
//! use syncdb_protocol::Fields;
//!
//! let db = SyncDatabase::new(
//!     SyncConfig::new("phone", "cloud", "apps"),
//!     SyncTable::in_memory("apps"),
//!     Arc::new(MockTransport::new()),
//!     Arc::new(MemoryCursorStore::new()),
//! );
//!
//! let mut row = Fields::new();
//! row.insert("name".into(), "notes".into());
//! db.insert_one("app-1", row).unwrap();
//!
//! // The write was broadcast as a `change` message.
//! assert_eq!(db.transport().take_sent().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]

mod config;
mod cursor;
mod database;
mod error;
mod observer;
pub mod recovery;
mod router;
mod stats;
mod transport;

pub use config::SyncConfig;
pub use cursor::{cursor_key, push_cursor_key, CursorStore, FileCursorStore, MemoryCursorStore};
pub use database::SyncDatabase;
pub use error::{SyncError, SyncResult};
pub use observer::{ChangeObserver, ChannelObserver, ObjectEvent};
pub use recovery::{RecoveryAction, RecoveryTracker};
pub use router::{MessageHandler, MessageRouter};
pub use stats::SyncStats;
pub use transport::{MockTransport, Outgoing, PeerTransport};
