//! Cache handler configuration
//!
//! In addition to the usual single-node options, this supports:
//! - `username` / `password` for ACL authentication
//! - `persistent` to keep node connections open across operations
//! - `tls` (bool or option string) to enable/configure transport security
//! - `cluster` to select the cluster backend instead of the single-node one

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::tls_options::TlsSetting;
use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Authentication configuration
///
/// A present `username` selects the ACL credential pair (Redis 6+ /
/// Valkey); password alone is the legacy single-secret AUTH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub password: String,
    pub username: Option<String>,
}

/// Complete cache handler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Comma-separated seed host list; entries may carry an explicit `:port`
    pub host: String,
    /// Default port appended to hosts that lack one
    pub port: u16,
    /// Connect and IO timeout in seconds; 0 uses the driver defaults
    pub timeout_secs: u64,
    /// Keep node connections open across operations
    pub persistent: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsSetting>,
    /// Key namespace prefix, empty for none
    pub prefix: String,
    /// Logical database index (SELECTed in single-node mode, and the
    /// `db<N>` keyspace line summarized by `cache_info`)
    pub database: u32,
    /// Select the cluster backend instead of the single-node one
    pub cluster: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout_secs: 0,
            persistent: false,
            username: None,
            password: None,
            tls: None,
            prefix: String::new(),
            database: 0,
            cluster: true,
        }
    }
}

impl CacheConfig {
    /// Parse the comma-separated host list into seed addresses.
    ///
    /// Hosts that already specify a `:port` are left untouched; the
    /// configured default port is appended to the rest. An empty result
    /// is a fatal configuration error.
    pub fn seed_addresses(&self) -> Result<Vec<ServerAddress>, ConfigError> {
        let default_port = if self.port > 0 { self.port } else { DEFAULT_PORT };

        let mut seeds = Vec::new();
        for entry in self.host.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let seed = match split_host_port(entry) {
                Some((host, port)) => ServerAddress::new(host, port),
                None => ServerAddress::new(entry, default_port),
            };
            seeds.push(seed);
        }

        if seeds.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        Ok(seeds)
    }

    /// Normalized auth credentials, or `None` when no password is set
    pub fn auth(&self) -> Option<AuthConfig> {
        self.password.as_ref().map(|password| AuthConfig {
            password: password.clone(),
            username: self.username.clone(),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        if self.timeout_secs > 0 {
            Duration::from_secs(self.timeout_secs)
        } else {
            DEFAULT_CONNECT_TIMEOUT
        }
    }

    pub fn io_timeout(&self) -> Duration {
        if self.timeout_secs > 0 {
            Duration::from_secs(self.timeout_secs)
        } else {
            DEFAULT_IO_TIMEOUT
        }
    }
}

/// Split a `host:port` entry, returning `None` when the entry carries no
/// explicit port (a trailing `:<digits>` suffix).
fn split_host_port(entry: &str) -> Option<(&str, u16)> {
    let (host, port_str) = entry.rsplit_once(':')?;
    if host.is_empty() || port_str.is_empty() || !port_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u16 = port_str.parse().ok()?;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_addresses_appends_default_port() {
        let config = CacheConfig {
            host: "cache-1,cache-2".to_string(),
            port: 7000,
            ..Default::default()
        };
        let seeds = config.seed_addresses().unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], ServerAddress::new("cache-1", 7000));
        assert_eq!(seeds[1], ServerAddress::new("cache-2", 7000));
    }

    #[test]
    fn test_seed_addresses_keeps_explicit_port() {
        let config = CacheConfig {
            host: "cache-1:6380, cache-2".to_string(),
            port: 7000,
            ..Default::default()
        };
        let seeds = config.seed_addresses().unwrap();
        assert_eq!(seeds[0], ServerAddress::new("cache-1", 6380));
        assert_eq!(seeds[1], ServerAddress::new("cache-2", 7000));
    }

    #[test]
    fn test_seed_addresses_numeric_hostname_is_not_a_port() {
        // A bare hostname ending in digits must not be mistaken for host:port
        let config = CacheConfig {
            host: "cache01".to_string(),
            ..Default::default()
        };
        let seeds = config.seed_addresses().unwrap();
        assert_eq!(seeds[0], ServerAddress::new("cache01", 6379));
    }

    #[test]
    fn test_seed_addresses_empty_is_fatal() {
        let config = CacheConfig {
            host: " , ,".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.seed_addresses(),
            Err(ConfigError::NoHosts)
        ));
    }

    #[test]
    fn test_auth_acl_pair() {
        let config = CacheConfig {
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let auth = config.auth().unwrap();
        assert_eq!(auth.username.as_deref(), Some("app"));
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn test_auth_legacy_password_only() {
        let config = CacheConfig {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let auth = config.auth().unwrap();
        assert!(auth.username.is_none());
    }

    #[test]
    fn test_auth_username_alone_is_ignored() {
        let config = CacheConfig {
            username: Some("app".to_string()),
            ..Default::default()
        };
        assert!(config.auth().is_none());
    }
}
