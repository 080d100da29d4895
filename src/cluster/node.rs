//! Cluster node representation

use crate::config::ServerAddress;

/// One cluster member parsed from CLUSTER NODES
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// Node ID
    pub id: String,
    pub host: String,
    pub port: u16,
    pub is_primary: bool,
    pub is_replica: bool,
    /// Primary node ID (for replicas)
    pub primary_id: Option<String>,
    /// Owned slot ranges, inclusive (for primaries)
    pub slot_ranges: Vec<(u16, u16)>,
    /// Node flags (fail, handshake, ...)
    pub flags: Vec<String>,
    /// Link state from CLUSTER NODES
    pub connected: bool,
}

impl ClusterNode {
    pub fn is_available(&self) -> bool {
        self.connected && !self.flags.iter().any(|f| f == "fail" || f == "handshake")
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }

    pub fn owns_slot(&self, slot: u16) -> bool {
        self.slot_ranges
            .iter()
            .any(|&(start, end)| slot >= start && slot <= end)
    }

    /// First owned slot, used to order primaries deterministically
    pub fn first_slot(&self) -> u16 {
        self.slot_ranges
            .iter()
            .map(|&(start, _)| start)
            .min()
            .unwrap_or(u16::MAX)
    }
}

/// Parse one line of a CLUSTER NODES reply.
///
/// Format: `<id> <ip:port@cport> <flags> <primary> <ping-sent>
/// <pong-recv> <config-epoch> <link-state> <slot> <slot> ...`
pub fn parse_cluster_node_line(line: &str) -> Option<ClusterNode> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return None;
    }

    let id = parts[0].to_string();
    let (host, port) = parse_node_address(parts[1])?;

    let flags: Vec<String> = parts[2].split(',').map(String::from).collect();
    let is_primary = flags.iter().any(|f| f == "master");
    let is_replica = flags.iter().any(|f| f == "slave" || f == "replica");

    let primary_id = if is_replica && parts[3] != "-" {
        Some(parts[3].to_string())
    } else {
        None
    };

    let connected = parts[7] == "connected";

    let mut slot_ranges = Vec::new();
    if is_primary {
        for &slot_str in &parts[8..] {
            if let Some(range) = parse_slot_range(slot_str) {
                slot_ranges.push(range);
            }
        }
    }

    Some(ClusterNode {
        id,
        host,
        port,
        is_primary,
        is_replica,
        primary_id,
        slot_ranges,
        flags,
        connected,
    })
}

/// Parse the address field.
/// Formats: `host:port@cport`, `host:port`, `host:port@cport,hostname`
fn parse_node_address(addr: &str) -> Option<(String, u16)> {
    // ElastiCache appends ",hostname"; the bus port after '@' is unused here
    let addr = addr.split(',').next().unwrap_or(addr);
    let host_port = addr.split('@').next().unwrap_or(addr);

    let (host, port_str) = host_port.rsplit_once(':')?;
    let port: u16 = port_str.parse().ok()?;
    Some((host.to_string(), port))
}

/// Parse a slot field: `0-5460` or `5461`. Importing/migrating slot
/// markers like `[123->-node]` are skipped.
fn parse_slot_range(s: &str) -> Option<(u16, u16)> {
    if s.contains('[') {
        return None;
    }

    match s.split_once('-') {
        Some((start, end)) => {
            let start: u16 = start.parse().ok()?;
            let end: u16 = end.parse().ok()?;
            Some((start, end))
        }
        None => {
            let slot: u16 = s.parse().ok()?;
            Some((slot, slot))
        }
    }
}
