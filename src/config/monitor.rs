//! Change monitor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between proxy polls in seconds
fn default_poll_interval() -> u64 {
    5
}

/// Change monitor configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Interval between polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl MonitorConfig {
    /// The poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
