//! Cache handler contract
//!
//! One capability trait implemented by the cluster backend and the
//! single-node backend; the configuration picks which one `connect`
//! builds.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::cluster::ClusterCache;
use crate::cache::codec::CacheValue;
use crate::cache::info::CacheInfo;
use crate::cache::standalone::StandaloneCache;
use crate::config::CacheConfig;
use crate::error::Result;

/// Keys matched per SCAN round trip during pattern deletion
pub(crate) const SCAN_COUNT: u32 = 1000;

/// Metadata for one stored key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMetadata {
    /// Absolute expiration epoch; `None` for a permanent key
    pub expire_epoch: Option<u64>,
    /// Approximate modification time (query time, not true last write)
    pub mtime: u64,
    pub data: CacheValue,
}

/// Operations every cache backend provides
pub trait CacheHandler: Send + Sync {
    /// Fetch a value; `None` iff the key is absent or expired
    fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store a value. `ttl_secs > 0` expires that many seconds from
    /// now; `ttl_secs == 0` stores permanently.
    fn save(&self, key: &str, value: &CacheValue, ttl_secs: u64) -> Result<()>;

    /// True iff the key existed and was removed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key matching a glob pattern, across all shards.
    /// Returns the number of keys deleted.
    fn delete_matching(&self, pattern: &str) -> Result<u64>;

    /// Remove all keys on every shard
    fn clean(&self) -> Result<()>;

    /// Atomically adjust the plain counter stored under `key`
    fn increment(&self, key: &str, offset: i64) -> Result<i64>;

    fn decrement(&self, key: &str, offset: i64) -> Result<i64>;

    /// Expiration, modification time, and value; `None` if absent
    fn metadata(&self, key: &str) -> Result<Option<KeyMetadata>>;

    /// Aggregated per-node statistics
    fn cache_info(&self) -> Result<CacheInfo>;

    fn is_supported(&self) -> bool;
}

/// Build the backend selected by the configuration
pub fn connect(config: &CacheConfig) -> Result<Box<dyn CacheHandler>> {
    if config.cluster {
        Ok(Box::new(ClusterCache::connect(config)?))
    } else {
        Ok(Box::new(StandaloneCache::connect(config)?))
    }
}

pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Absolute expiration from a TTL reply; negative TTLs (no expiration
/// or missing key) have none
pub(crate) fn expire_epoch_from_ttl(ttl: i64, now: u64) -> Option<u64> {
    if ttl > 0 {
        Some(now + ttl as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_epoch_from_ttl() {
        assert_eq!(expire_epoch_from_ttl(60, 1000), Some(1060));
        assert_eq!(expire_epoch_from_ttl(-1, 1000), None);
        assert_eq!(expire_epoch_from_ttl(-2, 1000), None);
    }
}
