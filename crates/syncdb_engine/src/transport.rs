//! Peer transport abstraction.
//!
//! The coordinator never owns a connection. It hands addressed envelopes
//! to a [`PeerTransport`] and learns about connectivity through
//! [`SyncDatabase::on_connected`](crate::SyncDatabase::on_connected).

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use syncdb_protocol::Envelope;

/// Delivers protocol messages to peers.
///
/// Implementations are fire-and-forget: a successful return means the
/// message was handed off, not that the peer processed it.
pub trait PeerTransport: Send + Sync {
    /// Sends an envelope to one peer.
    fn send_to(&self, peer: &str, envelope: Envelope) -> SyncResult<()>;

    /// Sends an envelope to every connected peer.
    fn broadcast(&self, envelope: Envelope) -> SyncResult<()>;

    /// Returns the currently connected peers this replica acts as a
    /// client towards.
    fn client_peers(&self) -> Vec<String>;

    /// Returns true if this replica acts as a client towards `peer`.
    fn is_client_peer(&self, peer: &str) -> bool {
        self.client_peers().iter().any(|p| p == peer)
    }
}

/// An envelope handed to a [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    /// Destination peer; `None` for a broadcast.
    pub to: Option<String>,
    /// The envelope.
    pub envelope: Envelope,
}

/// A transport for tests that records outgoing envelopes.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    client_peers: Mutex<BTreeSet<String>>,
    sent: Mutex<Vec<Outgoing>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected mock transport with no client peers.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            client_peers: Mutex::new(BTreeSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Adds a connected client-role peer.
    pub fn add_client_peer(&self, peer: impl Into<String>) {
        self.client_peers.lock().insert(peer.into());
    }

    /// Removes a client-role peer.
    pub fn remove_client_peer(&self, peer: &str) {
        self.client_peers.lock().remove(peer);
    }

    /// Sets the connected state. A disconnected transport fails every send.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Drains and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns the number of envelopes waiting in the outbox.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn record(&self, to: Option<&str>, envelope: Envelope) -> SyncResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.sent.lock().push(Outgoing {
            to: to.map(str::to_string),
            envelope,
        });
        Ok(())
    }
}

impl PeerTransport for MockTransport {
    fn send_to(&self, peer: &str, envelope: Envelope) -> SyncResult<()> {
        self.record(Some(peer), envelope)
    }

    fn broadcast(&self, envelope: Envelope) -> SyncResult<()> {
        self.record(None, envelope)
    }

    fn client_peers(&self) -> Vec<String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.client_peers.lock().iter().cloned().collect()
    }
}
