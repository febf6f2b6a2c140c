//! Configuration types for the Trino MCP server.
//!
//! All sections deserialize from YAML with defaults for every field, so an
//! empty document is a valid configuration. The binary layers command-line
//! flags on top of whatever the file provides; the core only ever sees the
//! resulting, already-validated [`ServerConfig`].
//!
//! ```yaml
//! name: Trino MCP
//! debug: false
//! mcp:
//!   transport: sse
//!   host: 127.0.0.1
//!   port: 3000
//! engine:
//!   host: localhost
//!   port: 8080
//!   user: trino
//!   catalog: memory
//!   max_rows: 10000
//! http_api:
//!   port: 3001
//! ```

pub mod engine;
pub mod http_api;
pub mod mcp;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use engine::{EngineConfig, PoolConfig};
pub use http_api::HttpApiConfig;
pub use mcp::{McpConfig, Transport};
pub use session::SessionConfig;

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported during protocol negotiation.
    #[serde(default = "default_name")]
    pub name: String,

    /// Server version reported during protocol negotiation.
    #[serde(default = "default_version")]
    pub version: String,

    /// Verbose logging and debug details in tool results.
    #[serde(default)]
    pub debug: bool,

    /// MCP transport settings.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Downstream Trino coordinator.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Direct HTTP query facade.
    #[serde(default)]
    pub http_api: HttpApiConfig,

    /// Per-session limits.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            debug: false,
            mcp: McpConfig::default(),
            engine: EngineConfig::default(),
            http_api: HttpApiConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("engine.catalog", &self.engine.catalog),
            ("engine.schema", &self.engine.schema),
        ] {
            if let Some(value) = value
                && !crate::is_valid_identifier(value)
            {
                return Err(ConfigError::Config(format!(
                    "{field} '{value}' is not a valid identifier"
                )));
            }
        }

        if self.engine.schema.is_some() && self.engine.catalog.is_none() {
            return Err(ConfigError::Config(
                "engine.schema requires engine.catalog".to_string(),
            ));
        }

        if self.engine.max_rows == 0 {
            return Err(ConfigError::Config(
                "engine.max_rows must be greater than zero".to_string(),
            ));
        }

        if self.engine.max_attempts == 0 {
            return Err(ConfigError::Config(
                "engine.max_attempts must be greater than zero".to_string(),
            ));
        }

        if self.http_api_enabled() && self.mcp.is_sse() && self.http_api_port() == self.mcp.port {
            return Err(ConfigError::Config(format!(
                "http_api port {} collides with the MCP SSE port",
                self.mcp.port
            )));
        }

        Ok(())
    }

    /// Whether the direct HTTP facade should be started.
    ///
    /// Defaults to on for the SSE transport and off for stdio, where the
    /// process is usually spawned by a desktop client.
    pub fn http_api_enabled(&self) -> bool {
        self.http_api.enabled.unwrap_or(self.mcp.is_sse())
    }

    /// Port for the direct HTTP facade; the MCP port plus one unless set.
    pub fn http_api_port(&self) -> u16 {
        self.http_api
            .port
            .unwrap_or_else(|| self.mcp.port.saturating_add(1))
    }
}

fn default_name() -> String {
    "Trino MCP".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
