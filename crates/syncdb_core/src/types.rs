//! Core type definitions for the record store.

use std::fmt;

/// Unique identifier for a transaction in the journal log.
///
/// Transaction IDs are monotonically increasing within one log and never
/// reused, including across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(TransactionId::new(9).to_string(), "txn:9");
    }
}
