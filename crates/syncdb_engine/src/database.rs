//! The per-collection sync coordinator.

use crate::config::SyncConfig;
use crate::cursor::CursorStore;
use crate::error::{SyncError, SyncResult};
use crate::observer::ChangeObserver;
use crate::recovery::{self, RecoveryTracker};
use crate::router::MessageHandler;
use crate::stats::SyncStats;
use crate::transport::PeerTransport;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncdb_core::{Record, SyncTable};
use syncdb_protocol::{Envelope, Fields, RecordChange, RowState, SyncMessage, Timestamp};
use tracing::{debug, error, info, warn};

/// A replicated collection.
///
/// Wraps a [`SyncTable`] and speaks the replication protocol with peers
/// through a [`PeerTransport`]. Local writes are broadcast as `change`
/// messages; on connection to a client-role peer a `sync-request` round
/// exchanges everything written since the stored cursor; merge failures
/// escalate to a force sync against the authority.
///
/// # Type Parameters
///
/// - `T`: The transport delivering messages to peers
/// - `C`: The store holding per-peer cursors
pub struct SyncDatabase<T: PeerTransport, C: CursorStore> {
    config: SyncConfig,
    table: SyncTable,
    transport: Arc<T>,
    cursors: Arc<C>,
    observers: RwLock<Vec<Arc<dyn ChangeObserver>>>,
    open: AtomicBool,
    recovery: RecoveryTracker,
    /// Peers with an unanswered `sync-request`, mapped to the local
    /// high-water-mark taken when the request was built.
    in_flight: Mutex<BTreeMap<String, Timestamp>>,
    stats: RwLock<SyncStats>,
}

impl<T: PeerTransport, C: CursorStore> SyncDatabase<T, C> {
    /// Creates a coordinator. It starts closed.
    pub fn new(config: SyncConfig, table: SyncTable, transport: Arc<T>, cursors: Arc<C>) -> Self {
        Self {
            config,
            table,
            transport,
            cursors,
            observers: RwLock::new(Vec::new()),
            open: AtomicBool::new(false),
            recovery: RecoveryTracker::new(),
            in_flight: Mutex::new(BTreeMap::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the underlying table.
    pub fn table(&self) -> &SyncTable {
        &self.table
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the cursor store.
    pub fn cursors(&self) -> &Arc<C> {
        &self.cursors
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Registers an observer for applied remote changes.
    pub fn add_observer(&self, observer: Arc<dyn ChangeObserver>) {
        self.observers.write().push(observer);
    }

    /// Returns the stored cursor for `peer`.
    pub fn cursor(&self, peer: &str) -> SyncResult<Timestamp> {
        Ok(self
            .cursors
            .get(&self.config.cursor_key(peer))?
            .unwrap_or(Timestamp::ZERO))
    }

    /// Returns the local high-water-mark covered by the last completed
    /// round with `peer`. Local changes after it have not reached `peer`
    /// through a sync round yet.
    pub fn push_cursor(&self, peer: &str) -> SyncResult<Timestamp> {
        Ok(self
            .cursors
            .get(&self.config.push_cursor_key(peer))?
            .unwrap_or(Timestamp::ZERO))
    }

    /// Returns true if a force sync against `peer` is outstanding.
    pub fn is_recovering_from(&self, peer: &str) -> bool {
        self.recovery.is_pending(peer)
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Attaches to connectivity events and syncs with every connected
    /// client-role peer.
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        info!(collection = %self.config.collection, replica = %self.config.replica_id, "sync opened");
        for peer in self.transport.client_peers() {
            self.sync_logged(&peer);
        }
    }

    /// Detaches from connectivity events.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        info!(collection = %self.config.collection, "sync closed");
    }

    /// Returns true between [`open`](Self::open) and [`close`](Self::close).
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Starts a sync round if open and `peer` is a client-role peer.
    pub fn on_connected(&self, peer: &str) {
        if !self.is_open() {
            debug!(collection = %self.config.collection, %peer, "closed, connection ignored");
            return;
        }
        if !self.transport.is_client_peer(peer) {
            return;
        }
        self.sync_logged(peer);
    }

    /// Sends a `sync-request` to `peer`.
    ///
    /// The request asks for everything after the peer's cursor and pushes
    /// every local change after the older of the two cursors. The peer
    /// cursor is on the peer's clock and the push cursor on ours, so
    /// neither alone bounds what the peer is missing.
    pub fn sync(&self, peer: &str) -> SyncResult<()> {
        let cursor = self.cursor(peer)?;
        let push_cursor = self.push_cursor(peer)?;
        // Read before the changes; later local writes sort above it.
        let high_water = self.table.last_modified();
        let values = self.table.get_changes_after(cursor.min(push_cursor));
        debug!(
            collection = %self.config.collection,
            %peer,
            cursor = cursor.as_u64(),
            push_cursor = push_cursor.as_u64(),
            pushed = values.len(),
            "sync request"
        );

        // Marked before sending; an in-process transport may deliver the
        // reply before send_to returns.
        self.in_flight.lock().insert(peer.to_string(), high_water);
        self.stats.write().sync_rounds += 1;
        let message = SyncMessage::SyncRequest {
            last_sync_time: cursor,
            values,
        };
        if let Err(err) = self.send(peer, message) {
            self.in_flight.lock().remove(peer);
            return Err(err);
        }
        Ok(())
    }

    fn sync_logged(&self, peer: &str) {
        if let Err(err) = self.sync(peer) {
            warn!(collection = %self.config.collection, %peer, error = %err, "sync round not started");
            self.record_error(&err);
        }
    }

    // ========================================================================
    // Local API
    // ========================================================================

    /// Returns every live record, ordered by id.
    pub fn get_all(&self) -> Vec<Record> {
        self.table.get_all()
    }

    /// Returns the live row for `id`.
    pub fn get_one(&self, id: &str) -> Option<Fields> {
        self.table.get_one(id)
    }

    /// Upserts a record and broadcasts the change.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the record store rejects the write.
    /// Broadcast failures are logged, never returned.
    pub fn insert_one(&self, id: &str, fields: Fields) -> SyncResult<Timestamp> {
        let last_modified = self.table.insert_one(id, fields.clone())?;
        self.broadcast_change(RecordChange::live(id, last_modified, fields));
        Ok(last_modified)
    }

    /// Deletes a record and broadcasts the tombstone.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the record store rejects the write.
    pub fn delete_one(&self, id: &str) -> SyncResult<Timestamp> {
        let last_modified = self.table.delete_one(id)?;
        self.broadcast_change(RecordChange::tombstone(id, last_modified));
        Ok(last_modified)
    }

    /// Asks the authority for a full snapshot.
    ///
    /// Does nothing on the authority itself.
    pub fn request_force_sync(&self) -> SyncResult<()> {
        if self.config.is_authority() {
            debug!(collection = %self.config.collection, "authority does not force sync");
            return Ok(());
        }
        let authority = self.config.authority.clone();
        self.recovery.begin(&authority);
        self.stats.write().force_syncs += 1;
        info!(collection = %self.config.collection, peer = %authority, "force sync requested");

        if let Err(err) = self.send(&authority, SyncMessage::ForceSync) {
            self.recovery.complete(&authority);
            return Err(err);
        }
        Ok(())
    }

    fn broadcast_change(&self, change: RecordChange) {
        let envelope = Envelope::new(self.config.channel(), SyncMessage::change(change));
        match self.transport.broadcast(envelope) {
            Ok(()) => self.stats.write().changes_broadcast += 1,
            Err(err) => {
                warn!(collection = %self.config.collection, error = %err, "change broadcast failed");
            }
        }
    }

    // ========================================================================
    // Incoming messages
    // ========================================================================

    /// Handles a protocol message from `from`.
    ///
    /// Never fails: merge failures start recovery, everything else is
    /// logged and dropped.
    pub fn handle_message(&self, from: &str, message: SyncMessage) {
        debug!(collection = %self.config.collection, peer = %from, op = message.op(), "message received");
        match message {
            SyncMessage::Change { .. } => {
                if let Some(change) = message.into_record_change() {
                    self.handle_change(from, change);
                }
            }
            SyncMessage::SyncRequest {
                last_sync_time,
                values,
            } => self.handle_sync_request(from, last_sync_time, values),
            SyncMessage::SyncReply {
                last_modified,
                values,
            } => self.handle_sync_reply(from, last_modified, values),
            SyncMessage::ForceSync => self.handle_force_sync(from),
            SyncMessage::ForceSyncData { values } => self.handle_force_sync_data(from, values),
            SyncMessage::DoForceSync => self.handle_do_force_sync(from),
        }
    }

    fn handle_change(&self, from: &str, change: RecordChange) {
        if self.config.is_protected(&change.id) {
            debug!(collection = %self.config.collection, peer = %from, id = %change.id, "change for protected id ignored");
            return;
        }

        let changes = [change];
        match self.table.handle_changes(&changes) {
            Ok(applied) => self.applied(&changes, &applied),
            Err(err) => self.recover(from, &SyncError::from(err)),
        }
    }

    fn handle_sync_request(&self, from: &str, since: Timestamp, pushed: Vec<RecordChange>) {
        let at = match self.table.sync_at(since, &pushed) {
            Ok(at) => at,
            Err(err) => {
                self.recover(from, &SyncError::from(err));
                return;
            }
        };
        self.applied(&pushed, &at.applied);

        debug!(
            collection = %self.config.collection,
            peer = %from,
            since = since.as_u64(),
            replied = at.changes.len(),
            last_modified = at.last_modified.as_u64(),
            "sync reply"
        );
        let reply = SyncMessage::SyncReply {
            last_modified: at.last_modified,
            values: at.changes,
        };
        if let Err(err) = self.send(from, reply) {
            warn!(collection = %self.config.collection, peer = %from, error = %err, "sync reply not sent");
            self.record_error(&err);
        }
    }

    fn handle_sync_reply(&self, from: &str, last_modified: Timestamp, values: Vec<RecordChange>) {
        let Some(mark) = self.in_flight.lock().remove(from) else {
            warn!(collection = %self.config.collection, peer = %from, "unexpected sync reply dropped");
            return;
        };

        match self.table.merge_reply(&values, mark) {
            Ok(merged) => {
                // Cursors only move once the whole batch is durable.
                let push_cursor = merged.quiet_high_water.unwrap_or(mark);
                self.store_cursors(from, last_modified, push_cursor);
                self.applied(&values, &merged.applied);
                info!(
                    collection = %self.config.collection,
                    peer = %from,
                    cursor = last_modified.as_u64(),
                    push_cursor = push_cursor.as_u64(),
                    applied = merged.applied.iter().filter(|a| **a).count(),
                    "sync round complete"
                );
            }
            Err(err) => self.recover(from, &SyncError::from(err)),
        }
    }

    fn handle_force_sync(&self, from: &str) {
        let snapshot = self.table.get_raw();
        info!(collection = %self.config.collection, peer = %from, entries = snapshot.len(), "sending snapshot");
        if let Err(err) = self.send(from, SyncMessage::ForceSyncData { values: snapshot }) {
            warn!(collection = %self.config.collection, peer = %from, error = %err, "snapshot not sent");
            self.record_error(&err);
        }
    }

    fn handle_force_sync_data(&self, from: &str, values: Vec<RecordChange>) {
        if self.config.is_authority() {
            warn!(collection = %self.config.collection, peer = %from, "authority ignores snapshot");
            return;
        }
        if !self.recovery.complete(from) {
            warn!(collection = %self.config.collection, peer = %from, "unsolicited snapshot dropped");
            return;
        }

        if let Err(err) = self.table.replace_all(values) {
            error!(collection = %self.config.collection, peer = %from, error = %err, "snapshot not adopted");
            self.record_error(&SyncError::from(err));
            return;
        }

        let high_water = self.table.last_modified();
        self.store_cursors(from, high_water, high_water);
        self.stats.write().recoveries += 1;
        info!(collection = %self.config.collection, peer = %from, cursor = high_water.as_u64(), "snapshot adopted");

        for observer in self.observers.read().iter() {
            observer.collection_replaced();
        }
    }

    fn handle_do_force_sync(&self, from: &str) {
        if self.config.is_authority() {
            warn!(collection = %self.config.collection, peer = %from, "authority ignores do-force-sync");
            return;
        }
        if let Err(err) = self.request_force_sync() {
            warn!(collection = %self.config.collection, error = %err, "force sync not requested");
            self.record_error(&err);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn store_cursors(&self, peer: &str, cursor: Timestamp, push_cursor: Timestamp) {
        let stored = self
            .cursors
            .set(&self.config.cursor_key(peer), cursor)
            .and_then(|()| self.cursors.set(&self.config.push_cursor_key(peer), push_cursor));
        if let Err(err) = stored {
            warn!(collection = %self.config.collection, %peer, error = %err, "cursor not stored");
            self.record_error(&err);
        }
    }

    fn send(&self, peer: &str, message: SyncMessage) -> SyncResult<()> {
        self.transport
            .send_to(peer, Envelope::new(self.config.channel(), message))
    }

    fn applied(&self, changes: &[RecordChange], applied: &[bool]) {
        self.stats.write().record_applied(applied);

        let observers = self.observers.read();
        if observers.is_empty() {
            return;
        }
        for (change, _) in changes.iter().zip(applied).filter(|(_, a)| **a) {
            for observer in observers.iter() {
                match &change.state {
                    RowState::Live(fields) => observer.object_added(&change.id, fields),
                    RowState::Tombstone => observer.object_removed(&change.id),
                }
            }
        }
    }

    fn recover(&self, from: &str, err: &SyncError) {
        warn!(collection = %self.config.collection, peer = %from, error = %err, "merge failed, starting recovery");
        self.record_error(err);

        let action = recovery::plan(&self.config, from);
        if action.is_force_sync() {
            self.recovery.begin(&action.peer);
            self.stats.write().force_syncs += 1;
        }
        let is_force_sync = action.is_force_sync();
        if let Err(send_err) = self.send(&action.peer, action.message) {
            error!(
                collection = %self.config.collection,
                peer = %action.peer,
                error = %send_err,
                "recovery message not sent"
            );
            if is_force_sync {
                self.recovery.complete(&action.peer);
            }
        }
    }

    fn record_error(&self, err: &SyncError) {
        self.stats.write().last_error = Some(err.to_string());
    }
}

impl<T: PeerTransport, C: CursorStore> MessageHandler for SyncDatabase<T, C> {
    fn handle_message(&self, from: &str, message: SyncMessage) {
        SyncDatabase::handle_message(self, from, message);
    }

    fn on_connected(&self, peer: &str) {
        SyncDatabase::on_connected(self, peer);
    }
}

impl<T: PeerTransport, C: CursorStore> std::fmt::Debug for SyncDatabase<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDatabase")
            .field("config", &self.config)
            .field("table", &self.table)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
