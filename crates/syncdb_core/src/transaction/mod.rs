//! Transaction management.
//!
//! Every multi-step change to a collection (row plus journal entry, a
//! merge batch, a full replacement) runs as one transaction:
//! - **Atomic**: all staged writes are logged and applied together, or none
//! - **Isolated**: readers see committed state only
//! - **Durable**: the journal log is written before state changes

mod queue;
mod write;

pub use queue::TransactionQueue;
pub use write::WriteTransaction;
