//! Cache handler backends
//!
//! The capability trait, the cluster and single-node implementations,
//! the stored-value codec, and the statistics aggregation.

pub mod cluster;
pub mod codec;
pub mod handler;
pub mod info;
pub mod standalone;

pub use cluster::ClusterCache;
pub use codec::{decode_value, encode_value, CacheValue};
pub use handler::{connect, CacheHandler, KeyMetadata};
pub use info::{CacheInfo, KeyspaceSummary};
pub use standalone::StandaloneCache;
