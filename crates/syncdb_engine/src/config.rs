//! Configuration for the sync coordinator.

use std::collections::BTreeSet;
use syncdb_protocol::CHANNEL_PREFIX;
use syncdb_protocol::WireFormat;

/// Configuration for one replicated collection on one replica.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// This replica's id.
    pub replica_id: String,
    /// Id of the replica whose state wins divergence recovery.
    pub authority: String,
    /// Collection name.
    pub collection: String,
    /// Prefix of the collection's channel name.
    pub channel_prefix: String,
    /// Wire format used when messages are handled as bytes.
    pub wire_format: WireFormat,
    /// Ids under this replica's exclusive control; `change` messages for
    /// them are ignored.
    pub protected_ids: BTreeSet<String>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(
        replica_id: impl Into<String>,
        authority: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            authority: authority.into(),
            collection: collection.into(),
            channel_prefix: CHANNEL_PREFIX.to_string(),
            wire_format: WireFormat::default(),
            protected_ids: BTreeSet::new(),
        }
    }

    /// Sets the channel prefix.
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Sets the wire format.
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Sets the protected ids.
    pub fn with_protected_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if this replica is the authority.
    pub fn is_authority(&self) -> bool {
        self.replica_id == self.authority
    }

    /// Returns true if `change` messages for `id` are ignored.
    pub fn is_protected(&self, id: &str) -> bool {
        self.protected_ids.contains(id)
    }

    /// Returns the channel name messages are addressed to.
    pub fn channel(&self) -> String {
        format!("{}{}", self.channel_prefix, self.collection)
    }

    /// Returns the pull cursor key for `peer`.
    pub fn cursor_key(&self, peer: &str) -> String {
        crate::cursor::cursor_key(&self.collection, peer)
    }

    /// Returns the push cursor key for `peer`.
    pub fn push_cursor_key(&self, peer: &str) -> String {
        crate::cursor::push_cursor_key(&self.collection, peer)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}
