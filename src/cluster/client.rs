//! Shared cluster session
//!
//! `ClusterClient` owns the live connections to the cluster: topology
//! bootstrap from the seed list, lazy per-node connections, slot-based
//! routing with MOVED/ASK refresh, and the per-node fan-out primitives
//! (scan, flush, info) the cache layer builds on.
//!
//! All operations are blocking round-trips. The node-connection pool is
//! behind one mutex, so concurrent callers of a shared client serialize
//! per conversation. Key prefixing is never connection state here; the
//! caller passes exact key names.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::client::commands::{is_transport_error, CommandsExt};
use crate::client::{ConnectionFactory, RawConnection, RespValue};
use crate::cluster::topology::ClusterTopology;
use crate::config::ServerAddress;
use crate::error::{CacheError, ClusterError, Result};

pub struct ClusterClient {
    factory: ConnectionFactory,
    seeds: Vec<ServerAddress>,
    /// Keep node connections pooled between operations
    persistent: bool,
    /// Distribute GET traffic across replicas of the owning shard
    distribute_replica_reads: bool,
    topology: RwLock<ClusterTopology>,
    connections: Mutex<HashMap<ServerAddress, RawConnection>>,
    read_counter: AtomicUsize,
}

impl ClusterClient {
    /// Bootstrap the cluster session from the seed list.
    ///
    /// The first reachable seed's CLUSTER NODES reply provides the full
    /// topology. Failure on every seed is fatal; there is no retry.
    pub fn connect(
        seeds: Vec<ServerAddress>,
        factory: ConnectionFactory,
        persistent: bool,
        distribute_replica_reads: bool,
    ) -> Result<Self> {
        let mut last_error = "no seed hosts".to_string();

        for seed in &seeds {
            let mut conn = match factory.create(seed) {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Seed {} unreachable: {}", seed, e);
                    last_error = e.to_string();
                    continue;
                }
            };

            let reply = match conn.cluster_nodes() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("CLUSTER NODES failed on seed {}: {}", seed, e);
                    last_error = format!("CLUSTER NODES on {}: {}", seed, e);
                    continue;
                }
            };

            let topology = match ClusterTopology::from_cluster_nodes(&reply) {
                Ok(topology) => topology,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            info!(
                "Connected to cluster via {}: {} primaries, {} nodes",
                seed,
                topology.num_primaries(),
                topology.num_nodes()
            );

            let client = Self {
                factory,
                seeds: seeds.clone(),
                persistent,
                distribute_replica_reads,
                topology: RwLock::new(topology),
                connections: Mutex::new(HashMap::new()),
                read_counter: AtomicUsize::new(0),
            };
            client.connections.lock().insert(seed.clone(), conn);
            return Ok(client);
        }

        Err(ClusterError::Bootstrap(last_error).into())
    }

    /// Addresses of all primaries, ordered by first owned slot
    pub fn primaries(&self) -> Vec<ServerAddress> {
        self.topology.read().primary_addresses()
    }

    pub fn primary_count(&self) -> usize {
        self.topology.read().num_primaries()
    }

    // -- single-key verbs ------------------------------------------------

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.distribute_replica_reads {
            if let Some(addr) = self.replica_for_key(key) {
                match self.with_node(&addr, |conn| conn.get(key)) {
                    Ok(value) => return Ok(value),
                    Err(e) => debug!("Replica read via {} failed ({}), using primary", addr, e),
                }
            }
        }
        self.keyed(key, |conn| conn.get(key))
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.keyed(key, |conn| conn.set(key, value))
    }

    pub fn set_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> Result<()> {
        self.keyed(key, |conn| conn.set_ex(key, seconds, value))
    }

    pub fn set_nx_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> Result<bool> {
        self.keyed(key, |conn| conn.set_nx_ex(key, seconds, value))
    }

    pub fn del_one(&self, key: &[u8]) -> Result<bool> {
        let removed = self.keyed(key, |conn| conn.del(&[key]))?;
        Ok(removed == 1)
    }

    pub fn incr_by(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.keyed(key, |conn| conn.incr_by(key, delta))
    }

    pub fn decr_by(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.keyed(key, |conn| conn.decr_by(key, delta))
    }

    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        self.keyed(key, |conn| conn.ttl(key))
    }

    // -- fan-out primitives ----------------------------------------------

    /// One SCAN step against a specific node. Transient transport
    /// failures redial the node and re-issue the same cursor.
    pub fn scan_node(
        &self,
        addr: &ServerAddress,
        cursor: u64,
        pattern: &[u8],
        count: u32,
    ) -> Result<(u64, Vec<Vec<u8>>)> {
        self.with_node(addr, |conn| conn.scan(cursor, pattern, count))
    }

    /// Delete keys by exact name, grouping them onto their owning
    /// primaries. Returns the summed deletion count. A topology change
    /// mid-delete triggers one refresh-and-regroup retry.
    pub fn del_exact(&self, keys: &[Vec<u8>]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0u64;
        let mut remaining: Vec<Vec<u8>> = keys.to_vec();

        for attempt in 0..2 {
            let groups = self.group_by_primary(&remaining)?;
            let mut redirected: Vec<Vec<u8>> = Vec::new();

            for (addr, batch) in groups {
                let refs: Vec<&[u8]> = batch.iter().map(|k| k.as_slice()).collect();
                match self.with_node(&addr, |conn| conn.del(&refs)) {
                    Ok(n) => deleted += n as u64,
                    Err(CacheError::Io(ref e)) if attempt == 0 && is_redirect(e) => {
                        redirected.extend(batch);
                    }
                    Err(e) => return Err(e),
                }
            }

            if redirected.is_empty() {
                break;
            }
            warn!(
                "{} keys moved during bulk delete, refreshing topology",
                redirected.len()
            );
            self.refresh_topology();
            remaining = redirected;
        }

        Ok(deleted)
    }

    /// Fetch the raw INFO text of every primary, in primary order
    pub fn info_per_primary(&self) -> Result<Vec<String>> {
        let mut infos = Vec::new();
        for addr in self.primaries() {
            infos.push(self.with_node(&addr, |conn| conn.info())?);
        }
        Ok(infos)
    }

    /// FLUSHALL on every primary
    pub fn flush_all_primaries(&self) -> Result<()> {
        for addr in self.primaries() {
            self.with_node(&addr, |conn| conn.flush_all())?;
        }
        Ok(())
    }

    // -- lifecycle -------------------------------------------------------

    /// Drop pooled connections when not running persistent. Called by
    /// the cache layer when a public operation completes.
    pub fn end_operation(&self) {
        if !self.persistent {
            self.connections.lock().clear();
        }
    }

    /// Close all node connections. Idempotent; safe when never used.
    pub fn close(&self) {
        self.connections.lock().clear();
    }

    // -- internals -------------------------------------------------------

    /// Run `op` against the primary owning `key`. A MOVED/ASK reply
    /// refreshes the topology and retries once.
    fn keyed<T>(&self, key: &[u8], op: impl Fn(&mut RawConnection) -> io::Result<T>) -> Result<T> {
        let addr = self.primary_for_key(key)?;
        match self.with_node(&addr, &op) {
            Err(CacheError::Io(ref e)) if is_redirect(e) => {
                warn!("Key redirected from {} ({}), refreshing topology", addr, e);
                self.refresh_topology();
                let addr = self.primary_for_key(key)?;
                self.with_node(&addr, &op)
            }
            other => other,
        }
    }

    fn primary_for_key(&self, key: &[u8]) -> Result<ServerAddress> {
        let slot = ClusterTopology::slot_for_key(key);
        let topology = self.topology.read();
        Ok(topology.primary_for_slot(slot)?.address())
    }

    /// Pick a replica of the owning shard for a read, round-robin.
    /// `None` when the shard has no available replica.
    fn replica_for_key(&self, key: &[u8]) -> Option<ServerAddress> {
        let slot = ClusterTopology::slot_for_key(key);
        let topology = self.topology.read();
        let primary = topology.primary_for_slot(slot).ok()?;
        let replicas = topology.replicas_of(&primary.id);
        if replicas.is_empty() {
            return None;
        }
        let idx = self.read_counter.fetch_add(1, Ordering::Relaxed) % replicas.len();
        Some(replicas[idx].address())
    }

    fn group_by_primary(&self, keys: &[Vec<u8>]) -> Result<Vec<(ServerAddress, Vec<Vec<u8>>)>> {
        let topology = self.topology.read();
        let mut groups: Vec<(ServerAddress, Vec<Vec<u8>>)> = Vec::new();

        for key in keys {
            let slot = ClusterTopology::slot_for_key(key);
            let addr = topology.primary_for_slot(slot)?.address();
            match groups.iter_mut().find(|(a, _)| *a == addr) {
                Some((_, batch)) => batch.push(key.clone()),
                None => groups.push((addr, vec![key.clone()])),
            }
        }
        Ok(groups)
    }

    /// Run `op` on a pooled connection to `addr`, dialing on demand.
    /// A broken transport is redialed once with the same operation.
    fn with_node<T>(
        &self,
        addr: &ServerAddress,
        op: impl Fn(&mut RawConnection) -> io::Result<T>,
    ) -> Result<T> {
        let mut connections = self.connections.lock();
        let mut conn = match connections.remove(addr) {
            Some(conn) => conn,
            None => self.open_node(addr)?,
        };

        let mut result = op(&mut conn);

        if let Err(ref e) = result {
            if is_transport_error(e) {
                debug!("Connection to {} dropped ({}), redialing", addr, e);
                conn = self.open_node(addr)?;
                result = op(&mut conn);
            }
        }

        match result {
            Ok(value) => {
                connections.insert(addr.clone(), conn);
                Ok(value)
            }
            Err(e) => {
                // Server replies leave the transport healthy; keep it
                if !is_transport_error(&e) {
                    connections.insert(addr.clone(), conn);
                }
                Err(e.into())
            }
        }
    }

    fn open_node(&self, addr: &ServerAddress) -> Result<RawConnection> {
        let mut conn = self.factory.create(addr)?;
        // Replica reads require the connection to opt in
        if self.topology.read().is_replica_address(addr) {
            conn.readonly().map_err(CacheError::Io)?;
        }
        Ok(conn)
    }

    /// Re-read the topology from any reachable seed or known primary.
    /// Pooled connections are dropped since their routing may be stale.
    fn refresh_topology(&self) -> bool {
        let mut candidates = self.seeds.clone();
        for addr in self.primaries() {
            if !candidates.contains(&addr) {
                candidates.push(addr);
            }
        }

        for addr in &candidates {
            let reply = match self
                .factory
                .create(addr)
                .map_err(CacheError::Connection)
                .and_then(|mut conn| conn.cluster_nodes().map_err(CacheError::Io))
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Topology refresh via {} failed: {}", addr, e);
                    continue;
                }
            };

            match ClusterTopology::from_cluster_nodes(&reply) {
                Ok(new_topology) => {
                    info!(
                        "Cluster topology refreshed: {} primaries, {} nodes",
                        new_topology.num_primaries(),
                        new_topology.num_nodes()
                    );
                    *self.topology.write() = new_topology;
                    self.connections.lock().clear();
                    return true;
                }
                Err(e) => {
                    warn!("Topology refresh via {} failed: {}", addr, e);
                }
            }
        }

        warn!("Failed to refresh cluster topology from any node");
        false
    }
}

/// True for MOVED/ASK server replies (flattened into IO errors by the
/// command layer)
fn is_redirect(e: &io::Error) -> bool {
    RespValue::Error(e.to_string()).redirect().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_redirect() {
        assert!(is_redirect(&io::Error::other("MOVED 3999 127.0.0.1:7001")));
        assert!(is_redirect(&io::Error::other("ASK 1234 10.0.0.5:6380")));
        assert!(!is_redirect(&io::Error::other("ERR unknown command")));
        assert!(!is_redirect(&io::Error::other("MOVEDX")));
    }

    // Live-cluster coverage for routing and fan-out lives in the cache
    // handler tests; everything below the network line is exercised via
    // the topology and command-parsing unit tests.
}
