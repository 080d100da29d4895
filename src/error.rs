//! Error types for valkey-cluster-cache

use std::io;
use thiserror::Error;

/// Top-level error for all cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors, fatal at setup time
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Must specify one or more comma-separated hosts in 'host' configuration")]
    NoHosts,
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("TLS handshake failed: {0}")]
    TlsFailed(String),
}

/// Stored-value and reply decoding errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to parse CLUSTER NODES response: {0}")]
    ParseFailed(String),

    #[error("No primary nodes found in cluster")]
    NoPrimaries,

    #[error("Slot {0} has no assigned node")]
    UnassignedSlot(u16),

    #[error("Cluster bootstrap failed, no seed reachable (last error: {0})")]
    Bootstrap(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
