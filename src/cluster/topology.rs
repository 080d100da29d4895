//! Cluster topology snapshot
//!
//! Parsed from one node's CLUSTER NODES reply. Routing is by hash
//! slot: CRC16(key) % 16384, with `{hash tag}` extraction so callers
//! can pin related keys to one shard.

use crate::cluster::node::{parse_cluster_node_line, ClusterNode};
use crate::config::ServerAddress;
use crate::error::ClusterError;

pub const SLOT_COUNT: u16 = 16384;

#[derive(Debug, Clone)]
pub struct ClusterTopology {
    nodes: Vec<ClusterNode>,
    /// Primary node indices ordered by first owned slot
    primary_indices: Vec<usize>,
}

impl ClusterTopology {
    /// Parse a CLUSTER NODES reply
    pub fn from_cluster_nodes(response: &str) -> Result<Self, ClusterError> {
        let mut nodes = Vec::new();
        for line in response.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some(node) = parse_cluster_node_line(line) {
                nodes.push(node);
            }
        }

        if nodes.is_empty() {
            return Err(ClusterError::ParseFailed(
                "no node lines in reply".to_string(),
            ));
        }

        let mut primary_indices: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_primary)
            .map(|(idx, _)| idx)
            .collect();

        if primary_indices.is_empty() {
            return Err(ClusterError::NoPrimaries);
        }

        // Deterministic node order for fan-out and aggregation
        primary_indices.sort_by_key(|&idx| nodes[idx].first_slot());

        Ok(Self {
            nodes,
            primary_indices,
        })
    }

    /// Primary owning the given slot
    pub fn primary_for_slot(&self, slot: u16) -> Result<&ClusterNode, ClusterError> {
        self.primary_indices
            .iter()
            .map(|&idx| &self.nodes[idx])
            .find(|n| n.owns_slot(slot))
            .ok_or(ClusterError::UnassignedSlot(slot))
    }

    /// All primaries, ordered by first owned slot
    pub fn primaries(&self) -> impl Iterator<Item = &ClusterNode> {
        self.primary_indices.iter().map(|&idx| &self.nodes[idx])
    }

    pub fn primary_addresses(&self) -> Vec<ServerAddress> {
        self.primaries().map(|n| n.address()).collect()
    }

    pub fn num_primaries(&self) -> usize {
        self.primary_indices.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Available replicas serving the given primary
    pub fn replicas_of(&self, primary_id: &str) -> Vec<&ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| {
                n.is_replica && n.is_available() && n.primary_id.as_deref() == Some(primary_id)
            })
            .collect()
    }

    /// True if the address belongs to a known replica
    pub fn is_replica_address(&self, addr: &ServerAddress) -> bool {
        self.nodes
            .iter()
            .any(|n| n.is_replica && n.host == addr.host && n.port == addr.port)
    }

    /// Hash slot for a key, honoring `{hash tag}` sections
    pub fn slot_for_key(key: &[u8]) -> u16 {
        if let Some(start) = key.iter().position(|&b| b == b'{') {
            if let Some(len) = key[start + 1..].iter().position(|&b| b == b'}') {
                if len > 0 {
                    return crc16(&key[start + 1..start + 1 + len]) % SLOT_COUNT;
                }
            }
        }
        crc16(key) % SLOT_COUNT
    }
}

/// CRC16/XMODEM as used for cluster slot hashing
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
