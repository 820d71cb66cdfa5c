//! # SyncDB Testkit
//!
//! Test utilities for SyncDB.
//!
//! This crate provides:
//! - Test fixtures and collection helpers
//! - Property-based test generators using proptest
//! - A simulated network with seeded message reordering
//! - Convergence assertions
//!
//! ## Usage
//!
//! ```rust
//! use syncdb_testkit::prelude::*;
//!
//! let mut net = SimNetwork::new(7, "cloud");
//! net.add_replica("cloud");
//! net.add_replica("phone");
//! net.link("phone", "cloud");
//! net.open_all();
//!
//! net.insert("phone", "app-1", row(1)).unwrap();
//! net.run();
//! net.assert_converged();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod assertions;
pub mod fixtures;
pub mod generators;
pub mod network;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::network::*;
}

pub use assertions::*;
pub use fixtures::*;
pub use generators::*;
pub use network::*;
