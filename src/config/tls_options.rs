//! TLS configuration
//!
//! `tls = true` turns on transport security with peer verification
//! disabled. A string value is parsed as a flat set of query-style
//! options (`verify_peer=1&cafile=/etc/ssl/ca.pem`) and passed through
//! verbatim. You should know what you're doing if you pass a string.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Raw `tls` configuration value: a toggle or an option string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TlsSetting {
    Bool(bool),
    Options(String),
}

/// Normalized transport-security options
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub verify_peer: bool,
    pub verify_peer_name: bool,
    pub ca_file: Option<PathBuf>,
    pub local_cert: Option<PathBuf>,
    pub local_pk: Option<PathBuf>,
    /// SNI hostname override
    pub peer_name: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_peer_name: true,
            ca_file: None,
            local_cert: None,
            local_pk: None,
            peer_name: None,
        }
    }
}

impl TlsOptions {
    /// Check if client certificate authentication is configured
    pub fn has_client_cert(&self) -> bool {
        self.local_cert.is_some() && self.local_pk.is_some()
    }
}

impl TlsSetting {
    /// Normalize into connection options; `None` means no TLS
    pub fn to_options(&self) -> Option<TlsOptions> {
        match self {
            TlsSetting::Bool(false) => None,
            TlsSetting::Bool(true) => Some(TlsOptions {
                verify_peer: false,
                verify_peer_name: false,
                ..Default::default()
            }),
            TlsSetting::Options(s) => Some(parse_option_string(s)),
        }
    }
}

/// Parse a flat `key=value&key=value` option string
fn parse_option_string(s: &str) -> TlsOptions {
    let mut options = TlsOptions::default();

    for pair in s.split('&') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));

        match key {
            "verify_peer" => options.verify_peer = parse_flag(value),
            "verify_peer_name" => options.verify_peer_name = parse_flag(value),
            "cafile" => options.ca_file = Some(PathBuf::from(value)),
            "local_cert" => options.local_cert = Some(PathBuf::from(value)),
            "local_pk" => options.local_pk = Some(PathBuf::from(value)),
            "peer_name" | "SNI_server_name" => options.peer_name = Some(value.to_string()),
            other => warn!("Ignoring unknown TLS option '{}'", other),
        }
    }

    options
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "on" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_true_disables_verification() {
        let options = TlsSetting::Bool(true).to_options().unwrap();
        assert!(!options.verify_peer);
        assert!(!options.verify_peer_name);
        assert!(options.ca_file.is_none());
    }

    #[test]
    fn test_bool_false_means_no_tls() {
        assert!(TlsSetting::Bool(false).to_options().is_none());
    }

    #[test]
    fn test_option_string_parsed_verbatim() {
        let setting =
            TlsSetting::Options("verify_peer=0&cafile=/etc/ssl/ca.pem&peer_name=cache.internal".to_string());
        let options = setting.to_options().unwrap();
        assert!(!options.verify_peer);
        // verify_peer_name was not named, so it keeps the secure default
        assert!(options.verify_peer_name);
        assert_eq!(options.ca_file, Some(PathBuf::from("/etc/ssl/ca.pem")));
        assert_eq!(options.peer_name.as_deref(), Some("cache.internal"));
    }

    #[test]
    fn test_option_string_client_cert_pair() {
        let setting =
            TlsSetting::Options("local_cert=client.pem&local_pk=client.key".to_string());
        let options = setting.to_options().unwrap();
        assert!(options.has_client_cert());
    }

    #[test]
    fn test_unknown_options_are_ignored() {
        let options = TlsSetting::Options("bogus=1&verify_peer=1".to_string())
            .to_options()
            .unwrap();
        assert!(options.verify_peer);
    }
}
