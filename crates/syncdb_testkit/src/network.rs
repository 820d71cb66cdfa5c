//! A simulated in-process network of replicas.
//!
//! Messages are encoded with the configured [`WireFormat`], queued, and
//! delivered one at a time in an order picked by a seeded RNG, so a failing
//! interleaving can be replayed from its seed. Each replica receives
//! through its own [`MessageRouter`].
//!
//! Links are directed `(client, server)` pairs: the client starts sync
//! rounds, both ends exchange `change` broadcasts. Taking a replica offline
//! loses every packet queued to or from it.
//!
//! The network keeps one [`ManualClock`] for true time. Each replica reads
//! it through its own clock, shifted by a fixed skew.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use syncdb_core::{Clock, ManualClock, SyncTable};
use syncdb_engine::{
    MemoryCursorStore, MessageRouter, PeerTransport, SyncConfig, SyncDatabase, SyncError,
    SyncResult,
};
use syncdb_protocol::{Envelope, Fields, Timestamp, WireFormat};

/// A replica attached to a [`SimNetwork`].
pub type SimReplica = SyncDatabase<SimTransport, MemoryCursorStore>;

/// Upper bound on deliveries in one [`SimNetwork::run`].
const MAX_DELIVERIES: usize = 100_000;

#[derive(Debug)]
struct Packet {
    from: String,
    to: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Wire {
    packets: Vec<Packet>,
    links: BTreeSet<(String, String)>,
    online: BTreeSet<String>,
}

impl Wire {
    fn reachable(&self, a: &str, b: &str) -> bool {
        let linked = self.links.contains(&(a.to_string(), b.to_string()))
            || self.links.contains(&(b.to_string(), a.to_string()));
        linked && self.online.contains(a) && self.online.contains(b)
    }

    fn neighbours(&self, node: &str) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|(client, server)| {
                if client == node {
                    Some(server.clone())
                } else if server == node {
                    Some(client.clone())
                } else {
                    None
                }
            })
            .filter(|peer| self.reachable(node, peer))
            .collect()
    }
}

/// The transport each simulated replica sends through.
#[derive(Debug)]
pub struct SimTransport {
    node: String,
    format: WireFormat,
    wire: Arc<Mutex<Wire>>,
}

impl SimTransport {
    fn push(&self, wire: &mut Wire, to: String, bytes: Vec<u8>) {
        wire.packets.push(Packet {
            from: self.node.clone(),
            to,
            bytes,
        });
    }
}

impl PeerTransport for SimTransport {
    fn send_to(&self, peer: &str, envelope: Envelope) -> SyncResult<()> {
        let bytes = self.format.encode(&envelope)?;
        let mut wire = self.wire.lock();
        if !wire.reachable(&self.node, peer) {
            return Err(SyncError::NotConnected);
        }
        self.push(&mut wire, peer.to_string(), bytes);
        Ok(())
    }

    fn broadcast(&self, envelope: Envelope) -> SyncResult<()> {
        let bytes = self.format.encode(&envelope)?;
        let mut wire = self.wire.lock();
        if !wire.online.contains(&self.node) {
            return Err(SyncError::NotConnected);
        }
        for peer in wire.neighbours(&self.node) {
            self.push(&mut wire, peer, bytes.clone());
        }
        Ok(())
    }

    fn client_peers(&self) -> Vec<String> {
        let wire = self.wire.lock();
        wire.links
            .iter()
            .filter(|(client, server)| client == &self.node && wire.reachable(client, server))
            .map(|(_, server)| server.clone())
            .collect()
    }
}

/// Reads the network clock shifted forward by a fixed skew.
#[derive(Debug)]
struct SkewedClock {
    base: Arc<ManualClock>,
    skew: u64,
}

impl Clock for SkewedClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.base.now().as_u64().saturating_add(self.skew))
    }
}

struct Node {
    replica: Arc<SimReplica>,
    router: MessageRouter,
}

/// A set of replicas exchanging messages over a simulated wire.
pub struct SimNetwork {
    wire: Arc<Mutex<Wire>>,
    nodes: BTreeMap<String, Node>,
    rng: StdRng,
    format: WireFormat,
    clock: Arc<ManualClock>,
    authority: String,
    collection: String,
    delivered: usize,
}

impl SimNetwork {
    /// Creates an empty network delivering in an order derived from `seed`.
    pub fn new(seed: u64, authority: impl Into<String>) -> Self {
        Self {
            wire: Arc::new(Mutex::new(Wire::default())),
            nodes: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            format: WireFormat::Json,
            clock: Arc::new(ManualClock::new(1)),
            authority: authority.into(),
            collection: "apps".to_string(),
            delivered: 0,
        }
    }

    /// Sets the wire format for replicas added afterwards.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the collection name for replicas added afterwards.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Returns the network's true clock. Replicas added with
    /// [`add_replica`](Self::add_replica) read it unshifted.
    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    /// Adds an online replica backed by an in-memory table reading the
    /// network clock.
    pub fn add_replica(&mut self, name: &str) -> Arc<SimReplica> {
        self.add_skewed_replica(name, 0)
    }

    /// Adds an online replica whose clock runs `skew` milliseconds ahead
    /// of the network clock.
    pub fn add_skewed_replica(&mut self, name: &str, skew: u64) -> Arc<SimReplica> {
        let clock = SkewedClock {
            base: self.clock.clone(),
            skew,
        };
        let table = SyncTable::in_memory(self.collection.clone()).with_clock(Arc::new(clock));
        self.add_replica_with_table(name, table)
    }

    /// Adds an online replica over `table`.
    pub fn add_replica_with_table(&mut self, name: &str, table: SyncTable) -> Arc<SimReplica> {
        let transport = SimTransport {
            node: name.to_string(),
            format: self.format,
            wire: self.wire.clone(),
        };
        let config = SyncConfig::new(name, self.authority.clone(), self.collection.clone())
            .with_wire_format(self.format);
        let replica = Arc::new(SyncDatabase::new(
            config,
            table,
            Arc::new(transport),
            Arc::new(MemoryCursorStore::new()),
        ));

        let router = MessageRouter::new(self.format);
        router
            .register(replica.config().channel(), replica.clone())
            .expect("Fresh router has no channels");

        self.wire.lock().online.insert(name.to_string());
        self.nodes.insert(
            name.to_string(),
            Node {
                replica: replica.clone(),
                router,
            },
        );
        replica
    }

    /// Returns a replica by name.
    ///
    /// # Panics
    ///
    /// Panics if no replica has that name.
    pub fn replica(&self, name: &str) -> Arc<SimReplica> {
        self.nodes
            .get(name)
            .unwrap_or_else(|| panic!("no replica named {name}"))
            .replica
            .clone()
    }

    /// Returns the replica names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Links `client` to `server` and fires connection events if both are
    /// online.
    pub fn link(&mut self, client: &str, server: &str) {
        self.wire
            .lock()
            .links
            .insert((client.to_string(), server.to_string()));
        self.fire_connected(client, server);
    }

    /// Opens every replica.
    pub fn open_all(&self) {
        for node in self.nodes.values() {
            node.replica.open();
        }
    }

    /// Returns true if `node` is online.
    pub fn is_online(&self, node: &str) -> bool {
        self.wire.lock().online.contains(node)
    }

    /// Takes a replica offline or brings it back.
    ///
    /// Going offline loses every queued packet to or from the replica.
    /// Coming back fires connection events on every reachable link.
    pub fn set_online(&mut self, node: &str, online: bool) {
        let peers = {
            let mut wire = self.wire.lock();
            if online {
                wire.online.insert(node.to_string());
                wire.neighbours(node)
            } else {
                wire.online.remove(node);
                wire.packets.retain(|p| p.from != node && p.to != node);
                Vec::new()
            }
        };
        for peer in peers {
            self.fire_connected(node, &peer);
        }
    }

    /// Fires connection events on every reachable link, starting a new
    /// sync round for every client.
    pub fn reconnect_all(&self) {
        let links: Vec<_> = self.wire.lock().links.iter().cloned().collect();
        for (client, server) in links {
            self.fire_connected(&client, &server);
        }
    }

    fn fire_connected(&self, a: &str, b: &str) {
        if !self.wire.lock().reachable(a, b) {
            return;
        }
        if let Some(node) = self.nodes.get(a) {
            node.router.peer_connected(b);
        }
        if let Some(node) = self.nodes.get(b) {
            node.router.peer_connected(a);
        }
    }

    /// Inserts on `node` after advancing the network clock.
    pub fn insert(&self, node: &str, id: &str, fields: Fields) -> SyncResult<Timestamp> {
        self.clock.advance(1);
        self.replica(node).insert_one(id, fields)
    }

    /// Deletes on `node` after advancing the network clock.
    pub fn delete(&self, node: &str, id: &str) -> SyncResult<Timestamp> {
        self.clock.advance(1);
        self.replica(node).delete_one(id)
    }

    /// Returns the number of queued packets.
    pub fn pending(&self) -> usize {
        self.wire.lock().packets.len()
    }

    /// Returns the number of packets delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Delivers one randomly chosen packet. Returns false if none is queued.
    pub fn step(&mut self) -> bool {
        let packet = {
            let mut wire = self.wire.lock();
            if wire.packets.is_empty() {
                return false;
            }
            let index = self.rng.gen_range(0..wire.packets.len());
            let packet = wire.packets.swap_remove(index);
            if !wire.reachable(&packet.from, &packet.to) {
                return true;
            }
            packet
        };

        if let Some(node) = self.nodes.get(&packet.to) {
            node.router.dispatch_bytes(&packet.from, &packet.bytes);
            self.delivered += 1;
        }
        true
    }

    /// Delivers packets until none is queued. Returns how many were
    /// delivered.
    ///
    /// # Panics
    ///
    /// Panics if the replicas keep talking past a large bound.
    pub fn run(&mut self) -> usize {
        let start = self.delivered;
        let mut steps = 0;
        while self.step() {
            steps += 1;
            assert!(steps < MAX_DELIVERIES, "network did not quiesce");
        }
        self.delivered - start
    }

    /// Returns each replica's collection digest.
    pub fn digests(&self) -> BTreeMap<String, String> {
        self.nodes
            .iter()
            .map(|(name, node)| {
                let digest = node.replica.table().digest().expect("Failed to digest collection");
                (name.clone(), digest)
            })
            .collect()
    }

    /// Asserts that every replica holds the same rows and journal.
    pub fn assert_converged(&self) {
        let names = self.names();
        crate::assertions::assert_tables_converged(
            &names
                .iter()
                .map(|name| {
                    let node = &self.nodes[name];
                    (name.as_str(), node.replica.table())
                })
                .collect::<Vec<_>>(),
        );
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("replicas", &self.names())
            .field("pending", &self.pending())
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::row;

    #[test]
    fn broadcast_reaches_linked_replicas_only() {
        let mut net = SimNetwork::new(1, "cloud");
        net.add_replica("cloud");
        net.add_replica("phone");
        net.add_replica("laptop");
        net.link("phone", "cloud");

        net.insert("cloud", "a", row(1)).unwrap();
        net.run();

        assert_eq!(net.replica("phone").get_one("a"), Some(row(1)));
        assert_eq!(net.replica("laptop").get_one("a"), None);
    }

    #[test]
    fn offline_replica_loses_queued_packets() {
        let mut net = SimNetwork::new(2, "cloud");
        net.add_replica("cloud");
        net.add_replica("phone");
        net.link("phone", "cloud");

        net.insert("cloud", "a", row(1)).unwrap();
        assert_eq!(net.pending(), 1);
        net.set_online("phone", false);
        assert_eq!(net.pending(), 0);
        assert!(!net.is_online("phone"));
    }

    #[test]
    fn reconnect_syncs_open_clients() {
        let mut net = SimNetwork::new(3, "cloud").with_format(WireFormat::Cbor);
        net.add_replica("cloud");
        net.add_replica("phone");
        net.link("phone", "cloud");
        net.open_all();
        net.run();

        net.set_online("phone", false);
        net.insert("cloud", "a", row(1)).unwrap();
        net.insert("phone", "b", row(2)).unwrap();
        net.set_online("phone", true);
        net.run();

        net.assert_converged();
        assert_eq!(net.replica("phone").get_one("a"), Some(row(1)));
        assert_eq!(net.replica("cloud").get_one("b"), Some(row(2)));
        assert!(net.delivered() >= 4);
    }

    #[test]
    fn skewed_replicas_stamp_from_their_own_clock() {
        let mut net = SimNetwork::new(4, "cloud");
        net.add_skewed_replica("cloud", 500);
        net.add_replica("phone");
        net.link("phone", "cloud");
        net.open_all();
        net.run();

        assert_eq!(net.insert("cloud", "a", row(1)).unwrap(), Timestamp(502));
        net.run();

        net.set_online("phone", false);
        let offline = net.insert("phone", "b", row(2)).unwrap();
        assert_eq!(offline, Timestamp(503));
        net.set_online("phone", true);
        net.run();

        net.assert_converged();
        assert_eq!(net.replica("cloud").get_one("b"), Some(row(2)));
    }
}
