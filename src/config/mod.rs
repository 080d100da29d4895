//! Configuration module

pub mod cache_config;
pub mod tls_options;

pub use cache_config::{AuthConfig, CacheConfig, ServerAddress};
pub use tls_options::{TlsOptions, TlsSetting};
