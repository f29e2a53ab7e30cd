//! Runtime collaborator configuration

use serde::{Deserialize, Serialize};

/// Default local SOCKS port requested from the runtime
fn default_socks_port() -> u16 {
    9050
}

/// Default system-proxy usage
fn default_use_system_proxy() -> bool {
    true
}

/// Settings handed to the anonymity-network runtime on start
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Local SOCKS port the runtime should listen on
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,

    /// Directory for persistent runtime state
    #[serde(default)]
    pub state_dir: String,

    /// Directory for the runtime cache
    #[serde(default)]
    pub cache_dir: String,

    /// Whether the runtime should follow the detected system proxy
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            socks_port: default_socks_port(),
            state_dir: String::new(),
            cache_dir: String::new(),
            use_system_proxy: default_use_system_proxy(),
        }
    }
}
