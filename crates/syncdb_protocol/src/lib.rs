//! # SyncDB Protocol
//!
//! Replication protocol types for SyncDB.
//!
//! This crate provides:
//! - [`RecordChange`] / [`RowState`] for a single journaled write
//! - [`SyncMessage`] and [`Envelope`] for the six protocol operations
//! - Last-writer-wins arbitration in [`conflict`]
//! - JSON and CBOR wire codecs via [`WireFormat`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
pub mod conflict;
mod error;
mod messages;

pub use change::{is_reserved_field, reads_as_tombstone, Fields, RecordChange, RowState, Timestamp, Value};
pub use codec::WireFormat;
pub use conflict::Resolution;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{channel_name, Envelope, SyncMessage, CHANNEL_PREFIX};
