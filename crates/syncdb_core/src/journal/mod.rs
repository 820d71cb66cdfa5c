//! Durable journal log.
//!
//! Every committed transaction is appended to the collection's log as a
//! run of framed records:
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Payloads are CBOR. A transaction is `BEGIN`, then any mix of `PUT`,
//! `DELETE` and `RESET`, then `COMMIT`.
//!
//! ## Recovery Policy
//!
//! - An incomplete frame at the tail is a crash mid-append: it is cut off
//!   and the open proceeds.
//! - Records of a transaction without a `COMMIT` are discarded.
//! - A bad magic, unknown version or type, or CRC mismatch is corruption
//!   and fails the open.

mod log;
mod record;

pub use log::{parse_frames, JournalLog, LogScan};
pub use record::{
    compute_crc32, JournalRecord, JournalRecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};
