//! Routes incoming envelopes to collection handlers by channel name.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use syncdb_protocol::{Envelope, SyncMessage, WireFormat};
use tracing::{debug, warn};

/// Handles the messages addressed to one channel.
pub trait MessageHandler: Send + Sync {
    /// Handles a message received from `from`.
    fn handle_message(&self, from: &str, message: SyncMessage);

    /// Called when `peer` connects.
    fn on_connected(&self, _peer: &str) {}
}

/// A per-process registry of channel handlers.
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    format: WireFormat,
}

impl MessageRouter {
    /// Creates a router decoding raw bytes with `format`.
    pub fn new(format: WireFormat) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            format,
        }
    }

    /// Returns the wire format used by [`dispatch_bytes`](Self::dispatch_bytes).
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Registers a handler for `channel`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChannel` if the channel already has a handler.
    pub fn register(
        &self,
        channel: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> SyncResult<()> {
        let channel = channel.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&channel) {
            return Err(SyncError::DuplicateChannel { channel });
        }
        debug!(%channel, "channel registered");
        handlers.insert(channel, handler);
        Ok(())
    }

    /// Removes the handler for `channel`. Returns true if one was registered.
    pub fn unregister(&self, channel: &str) -> bool {
        self.handlers.write().remove(channel).is_some()
    }

    /// Returns the registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = self.handlers.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Delivers an envelope to its channel's handler.
    ///
    /// Returns false if no handler is registered for the target.
    pub fn dispatch(&self, from: &str, envelope: Envelope) -> bool {
        // Registry lock is released before the handler runs.
        let handler = self.handlers.read().get(&envelope.target).cloned();
        match handler {
            Some(handler) => {
                handler.handle_message(from, envelope.message);
                true
            }
            None => {
                warn!(peer = %from, target = %envelope.target, "message for unknown channel dropped");
                false
            }
        }
    }

    /// Decodes and delivers a raw message.
    ///
    /// Malformed input is logged and dropped.
    pub fn dispatch_bytes(&self, from: &str, bytes: &[u8]) -> bool {
        match self.format.decode(bytes) {
            Ok(envelope) => self.dispatch(from, envelope),
            Err(err) => {
                warn!(peer = %from, format = self.format.name(), error = %err, "malformed message dropped");
                false
            }
        }
    }

    /// Tells every handler that `peer` connected.
    pub fn peer_connected(&self, peer: &str) {
        let handlers: Vec<_> = self.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler.on_connected(peer);
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(WireFormat::default())
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("channels", &self.channels())
            .field("format", &self.format)
            .finish()
    }
}
