//! Tunnel client and TLS configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connection timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default TCP_NODELAY setting
fn default_nodelay() -> bool {
    true
}

/// Default TCP keepalive timeout in seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default TCP keepalive interval in seconds
fn default_keepalive_interval() -> u64 {
    8
}

/// Tunnel client configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// Timeout for connecting to the proxy, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Enable TCP_NODELAY on proxy connections
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            connect_timeout_secs: default_connect_timeout(),
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

impl TunnelConfig {
    /// The connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// TLS upgrade configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Path to an additional trusted root certificate (PEM)
    #[serde(default)]
    pub trusted_root: Option<String>,

    /// Skip certificate verification (testing only)
    #[serde(default)]
    pub skip_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_config_default() {
        let config = TunnelConfig::default();
        assert_eq!(config.connect_timeout_secs, 10);
        assert!(config.nodelay);
        assert_eq!(config.keepalive_secs, 20);
        assert_eq!(config.keepalive_interval, 8);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_tls_config_default() {
        let config = TlsConfig::default();
        assert!(config.trusted_root.is_none());
        assert!(!config.skip_verify);
    }
}
