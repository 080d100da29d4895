//! Cluster topology and the shared cluster session
//!
//! - Topology discovery via CLUSTER NODES
//! - Slot mapping and CRC16 routing
//! - Lazy per-node connections with MOVED/ASK refresh
//! - Sequential per-primary fan-out (scan, flush, info)

pub mod client;
pub mod node;
pub mod topology;

pub use client::ClusterClient;
pub use node::ClusterNode;
pub use topology::ClusterTopology;
