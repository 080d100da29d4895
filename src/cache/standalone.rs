//! Single-node cache backend
//!
//! Same contract as the cluster backend, against one server. The
//! command seam is generic so unit tests can script the conversation.

use parking_lot::Mutex;

use crate::cache::codec::{decode_value, encode_value, CacheValue};
use crate::cache::handler::{
    expire_epoch_from_ttl, now_epoch, CacheHandler, KeyMetadata, SCAN_COUNT,
};
use crate::cache::info::{aggregate_info, CacheInfo};
use crate::client::{Commands, CommandsExt, ConnectionFactory, RawConnection, Timeouts};
use crate::config::CacheConfig;
use crate::error::Result;

pub struct StandaloneCache<C: Commands + Send = RawConnection> {
    conn: Mutex<C>,
    prefix: String,
    database: u32,
}

impl StandaloneCache<RawConnection> {
    /// Connect to the first configured host
    pub fn connect(config: &CacheConfig) -> Result<Self> {
        let seeds = config.seed_addresses()?;
        let factory = ConnectionFactory {
            timeouts: Timeouts {
                connect: config.connect_timeout(),
                io: config.io_timeout(),
            },
            tls: config.tls.as_ref().and_then(|t| t.to_options()),
            auth: config.auth(),
            database: Some(config.database),
        };

        let conn = factory.create(&seeds[0])?;
        Ok(Self::with_connection(conn, &config.prefix, config.database))
    }
}

impl<C: Commands + Send> StandaloneCache<C> {
    pub fn with_connection(conn: C, prefix: &str, database: u32) -> Self {
        Self {
            conn: Mutex::new(conn),
            prefix: prefix.to_string(),
            database,
        }
    }

    fn prefixed(&self, key: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(key.as_bytes());
        out
    }
}

impl<C: Commands + Send> CacheHandler for StandaloneCache<C> {
    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        match self.conn.lock().get(&self.prefixed(key))? {
            Some(data) => Ok(Some(decode_value(&data)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &CacheValue, ttl_secs: u64) -> Result<()> {
        let key = self.prefixed(key);
        let payload = encode_value(value);
        let mut conn = self.conn.lock();
        if ttl_secs > 0 {
            conn.set_ex(&key, ttl_secs, &payload)?;
        } else {
            conn.set(&key, &payload)?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let key = self.prefixed(key);
        Ok(self.conn.lock().del(&[key.as_slice()])? == 1)
    }

    fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let pattern = self.prefixed(pattern);
        let mut conn = self.conn.lock();

        let mut matched: Vec<Vec<u8>> = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys) = conn.scan(cursor, &pattern, SCAN_COUNT)?;
            matched.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if matched.is_empty() {
            return Ok(0);
        }
        let refs: Vec<&[u8]> = matched.iter().map(|k| k.as_slice()).collect();
        Ok(conn.del(&refs)? as u64)
    }

    fn clean(&self) -> Result<()> {
        self.conn.lock().flush_db()?;
        Ok(())
    }

    fn increment(&self, key: &str, offset: i64) -> Result<i64> {
        Ok(self.conn.lock().incr_by(&self.prefixed(key), offset)?)
    }

    fn decrement(&self, key: &str, offset: i64) -> Result<i64> {
        Ok(self.conn.lock().decr_by(&self.prefixed(key), offset)?)
    }

    fn metadata(&self, key: &str) -> Result<Option<KeyMetadata>> {
        let key = self.prefixed(key);
        let mut conn = self.conn.lock();

        let Some(data) = conn.get(&key)? else {
            return Ok(None);
        };

        let now = now_epoch();
        let ttl = conn.ttl(&key)?;

        Ok(Some(KeyMetadata {
            expire_epoch: expire_epoch_from_ttl(ttl, now),
            mtime: now,
            data: decode_value(&data)?,
        }))
    }

    fn cache_info(&self) -> Result<CacheInfo> {
        let raw = self.conn.lock().info()?;
        Ok(aggregate_info(&[raw], self.database))
    }

    fn is_supported(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::commands::mock::MockCommands;
    use crate::client::RespValue;

    fn handler(replies: Vec<RespValue>) -> StandaloneCache<MockCommands> {
        StandaloneCache::with_connection(MockCommands::new(replies), "app:", 0)
    }

    fn sent(cache: &StandaloneCache<MockCommands>) -> Vec<Vec<Vec<u8>>> {
        cache.conn.lock().sent.clone()
    }

    #[test]
    fn test_save_and_get_apply_prefix() {
        let cache = handler(vec![
            RespValue::SimpleString("OK".to_string()),
            RespValue::BulkString(encode_value(&CacheValue::from("v"))),
        ]);

        cache.save("k", &CacheValue::from("v"), 0).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(CacheValue::from("v")));

        let commands = sent(&cache);
        assert_eq!(commands[0][1], b"app:k".to_vec());
        assert_eq!(commands[1][1], b"app:k".to_vec());
    }

    #[test]
    fn test_save_with_ttl_uses_setex() {
        let cache = handler(vec![RespValue::SimpleString("OK".to_string())]);
        cache.save("k", &CacheValue::from("v"), 60).unwrap();

        let commands = sent(&cache);
        assert_eq!(commands[0][0], b"SETEX".to_vec());
        assert_eq!(commands[0][2], b"60".to_vec());
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = handler(vec![RespValue::Null]);
        assert_eq!(cache.get("missing").unwrap(), None);
    }

    #[test]
    fn test_delete_reports_existence() {
        let cache = handler(vec![RespValue::Integer(1), RespValue::Integer(0)]);
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
    }

    #[test]
    fn test_increment_decrement_round_numbers() {
        let cache = handler(vec![RespValue::Integer(1), RespValue::Integer(11)]);
        assert_eq!(cache.increment("n", 1).unwrap(), 1);
        assert_eq!(cache.increment("n", 10).unwrap(), 11);

        let commands = sent(&cache);
        assert_eq!(commands[0][0], b"INCRBY".to_vec());
        assert_eq!(commands[0][1], b"app:n".to_vec());
    }

    #[test]
    fn test_metadata_permanent_key() {
        let cache = handler(vec![
            RespValue::BulkString(encode_value(&CacheValue::from("v"))),
            RespValue::Integer(-1),
        ]);

        let meta = cache.metadata("k").unwrap().unwrap();
        assert_eq!(meta.expire_epoch, None);
        assert_eq!(meta.data, CacheValue::from("v"));
    }

    #[test]
    fn test_metadata_missing_key() {
        let cache = handler(vec![RespValue::Null]);
        assert_eq!(cache.metadata("k").unwrap(), None);
    }

    fn scan_reply(cursor: &str, keys: &[&[u8]]) -> RespValue {
        RespValue::Array(vec![
            RespValue::BulkString(cursor.as_bytes().to_vec()),
            RespValue::Array(
                keys.iter()
                    .map(|k| RespValue::BulkString(k.to_vec()))
                    .collect(),
            ),
        ])
    }

    #[test]
    fn test_delete_matching_scans_until_cursor_zero() {
        // Middle step returns an empty batch with a live cursor; the
        // loop must continue past it.
        let cache = handler(vec![
            scan_reply("5", &[b"app:key_1"]),
            scan_reply("9", &[]),
            scan_reply("0", &[b"app:key_10"]),
            RespValue::Integer(2),
        ]);

        assert_eq!(cache.delete_matching("key_1*").unwrap(), 2);

        let commands = sent(&cache);
        // Pattern carries the prefix
        assert_eq!(commands[0][3], b"app:key_1*".to_vec());
        // Cursor advanced between steps
        assert_eq!(commands[1][1], b"5".to_vec());
        assert_eq!(commands[2][1], b"9".to_vec());
        // Matched keys deleted by exact (already prefixed) name
        assert_eq!(
            commands[3],
            vec![b"DEL".to_vec(), b"app:key_1".to_vec(), b"app:key_10".to_vec()]
        );
    }

    #[test]
    fn test_delete_matching_nothing_matched() {
        let cache = handler(vec![scan_reply("0", &[])]);
        assert_eq!(cache.delete_matching("none*").unwrap(), 0);
        // No DEL was issued
        assert_eq!(sent(&cache).len(), 1);
    }

    #[test]
    fn test_clean_flushes_selected_database() {
        let cache = handler(vec![RespValue::SimpleString("OK".to_string())]);
        cache.clean().unwrap();
        assert_eq!(sent(&cache)[0][0], b"FLUSHDB".to_vec());
    }

    #[test]
    fn test_cache_info_summarizes_keyspace() {
        let raw = "# Keyspace\r\ndb0:keys=4,expires=1,avg_ttl=50\r\n";
        let cache = handler(vec![RespValue::BulkString(raw.as_bytes().to_vec())]);

        let info = cache.cache_info().unwrap();
        assert_eq!(info.keyspace(0).unwrap().keys, 4);
    }
}
