//! Per-session limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long in-flight tool calls may run after shutdown begins.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    /// Extra connections a session keeps for catalog/schema overrides.
    #[serde(default = "default_max_override_connections")]
    pub max_override_connections: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_seconds: default_shutdown_grace(),
            max_override_connections: default_max_override_connections(),
        }
    }
}

impl SessionConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_override_connections() -> usize {
    4
}
