//! Cluster cache backend
//!
//! Runs the cache handler contract against a sharded multi-primary
//! cluster through one shared `ClusterClient`. Single-key operations
//! apply the configured prefix explicitly and route by hash slot;
//! pattern deletion and statistics fan out across every primary.

use std::sync::Arc;

use tracing::debug;

use crate::cache::codec::{decode_value, encode_value, CacheValue};
use crate::cache::handler::{
    expire_epoch_from_ttl, now_epoch, CacheHandler, KeyMetadata, SCAN_COUNT,
};
use crate::cache::info::{aggregate_info, CacheInfo};
use crate::client::{ConnectionFactory, Timeouts};
use crate::cluster::ClusterClient;
use crate::config::CacheConfig;
use crate::error::Result;

pub struct ClusterCache {
    client: Arc<ClusterClient>,
    prefix: String,
    database: u32,
}

impl ClusterCache {
    /// Establish the shared cluster session from the configuration.
    /// Connection and bootstrap failures are fatal here, not retried.
    pub fn connect(config: &CacheConfig) -> Result<Self> {
        let seeds = config.seed_addresses()?;
        let factory = ConnectionFactory {
            timeouts: Timeouts {
                connect: config.connect_timeout(),
                io: config.io_timeout(),
            },
            tls: config.tls.as_ref().and_then(|t| t.to_options()),
            auth: config.auth(),
            // The cluster keyspace is always database 0; `database`
            // only selects the keyspace line summarized by cache_info.
            database: None,
        };

        let client = ClusterClient::connect(seeds, factory, config.persistent, true)?;

        Ok(Self {
            client: Arc::new(client),
            prefix: config.prefix.clone(),
            database: config.database,
        })
    }

    /// The already-open shared connection, for collaborating
    /// subsystems (session storage) that must not open a second one.
    pub fn client(&self) -> Arc<ClusterClient> {
        Arc::clone(&self.client)
    }

    /// Close the underlying connections. Safe to call at any point.
    pub fn close(&self) {
        self.client.close();
    }

    fn prefixed(&self, key: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(key.as_bytes());
        out
    }

    /// Run one public operation, releasing pooled connections after it
    /// when the handler is not persistent.
    fn run<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = op();
        self.client.end_operation();
        result
    }
}

impl CacheHandler for ClusterCache {
    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.run(|| {
            match self.client.get(&self.prefixed(key))? {
                Some(data) => Ok(Some(decode_value(&data)?)),
                None => Ok(None),
            }
        })
    }

    fn save(&self, key: &str, value: &CacheValue, ttl_secs: u64) -> Result<()> {
        self.run(|| {
            let key = self.prefixed(key);
            let payload = encode_value(value);
            if ttl_secs > 0 {
                self.client.set_ex(&key, ttl_secs, &payload)
            } else {
                self.client.set(&key, &payload)
            }
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.run(|| self.client.del_one(&self.prefixed(key)))
    }

    fn delete_matching(&self, pattern: &str) -> Result<u64> {
        self.run(|| {
            // Scans never apply the key prefix the way single-key
            // operations do, so the pattern gets it here.
            let pattern = self.prefixed(pattern);
            let mut matched: Vec<Vec<u8>> = Vec::new();

            for addr in self.client.primaries() {
                let mut cursor = 0u64;
                loop {
                    let (next, keys) =
                        self.client.scan_node(&addr, cursor, &pattern, SCAN_COUNT)?;
                    matched.extend(keys);
                    // Only the cursor signals completion; an empty
                    // batch mid-scan does not.
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
            }

            debug!(
                "Pattern delete matched {} keys across {} primaries",
                matched.len(),
                self.client.primary_count()
            );

            // Accumulated keys are already fully prefixed; delete them
            // by exact name.
            self.client.del_exact(&matched)
        })
    }

    fn clean(&self) -> Result<()> {
        self.run(|| self.client.flush_all_primaries())
    }

    fn increment(&self, key: &str, offset: i64) -> Result<i64> {
        self.run(|| self.client.incr_by(&self.prefixed(key), offset))
    }

    fn decrement(&self, key: &str, offset: i64) -> Result<i64> {
        self.run(|| self.client.decr_by(&self.prefixed(key), offset))
    }

    fn metadata(&self, key: &str) -> Result<Option<KeyMetadata>> {
        self.run(|| {
            let prefixed = self.prefixed(key);
            let Some(data) = self.client.get(&prefixed)? else {
                return Ok(None);
            };

            let now = now_epoch();
            let ttl = self.client.ttl(&prefixed)?;

            Ok(Some(KeyMetadata {
                expire_epoch: expire_epoch_from_ttl(ttl, now),
                mtime: now,
                data: decode_value(&data)?,
            }))
        })
    }

    fn cache_info(&self) -> Result<CacheInfo> {
        self.run(|| {
            let infos = self.client.info_per_primary()?;
            Ok(aggregate_info(&infos, self.database))
        })
    }

    fn is_supported(&self) -> bool {
        // The driver is built into this crate; TLS-less builds fail at
        // connect time instead.
        true
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        self.client.close();
    }
}
