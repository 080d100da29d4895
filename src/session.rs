//! Session storage over the cache's already-open cluster connection
//!
//! Sessions reuse the cache subsystem's live `ClusterClient` instead of
//! opening a second connection: the handle is injected explicitly at
//! construction. Closing the store releases its session lock but never
//! tears down the shared connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::ClusterCache;
use crate::cluster::ClusterClient;
use crate::error::Result;

pub struct SessionStore {
    client: Arc<ClusterClient>,
    prefix: String,
    ttl_secs: u64,
    lock_key: Mutex<Option<Vec<u8>>>,
}

impl SessionStore {
    /// Borrow the cache's open connection
    pub fn open(cache: &ClusterCache, prefix: &str, ttl_secs: u64) -> Self {
        Self::with_client(cache.client(), prefix, ttl_secs)
    }

    /// Explicit injection of a shared connection handle
    pub fn with_client(client: Arc<ClusterClient>, prefix: &str, ttl_secs: u64) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
            ttl_secs,
            lock_key: Mutex::new(None),
        }
    }

    pub fn read(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        self.client.get(&self.session_key(session_id))
    }

    pub fn write(&self, session_id: &str, data: &[u8]) -> Result<()> {
        self.client
            .set_ex(&self.session_key(session_id), self.ttl_secs, data)
    }

    pub fn destroy(&self, session_id: &str) -> Result<bool> {
        self.client.del_one(&self.session_key(session_id))
    }

    /// Acquire the cooperative per-session lock. False when another
    /// holder already has it.
    pub fn lock(&self, session_id: &str) -> Result<bool> {
        let key = self.lock_key_for(session_id);
        let acquired = self.client.set_nx_ex(&key, self.ttl_secs, b"1")?;
        if acquired {
            *self.lock_key.lock() = Some(key);
        } else {
            debug!("Session {} is locked by another holder", session_id);
        }
        Ok(acquired)
    }

    /// Release the held lock, if any. The shared connection stays open
    /// for the cache subsystem.
    pub fn close(&self) -> Result<()> {
        if let Some(key) = self.lock_key.lock().take() {
            self.client.del_one(&key)?;
        }
        Ok(())
    }

    fn session_key(&self, session_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + session_id.len());
        key.extend_from_slice(self.prefix.as_bytes());
        key.extend_from_slice(session_id.as_bytes());
        key
    }

    fn lock_key_for(&self, session_id: &str) -> Vec<u8> {
        let mut key = self.session_key(session_id);
        key.extend_from_slice(b":lock");
        key
    }
}
