//! Configuration module for Sockswatch
//!
//! This module provides configuration types and parsing for the monitor,
//! the tunnel clients and the runtime collaborator.

mod monitor;
mod runtime;
mod tunnel;

pub use monitor::MonitorConfig;
pub use runtime::RuntimeConfig;
pub use tunnel::{TlsConfig, TunnelConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Change monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Tunnel client configuration
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// TLS upgrade configuration
    #[serde(default)]
    pub tls: TlsConfig,

    /// Runtime collaborator configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}
