//! Direct HTTP query facade configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the plain HTTP query endpoint.
///
/// The facade runs beside the MCP transport and executes queries without the
/// protocol handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpApiConfig {
    /// Whether to start the facade. Unset means "on for SSE, off for stdio".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. Unset means the MCP port plus one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            host: default_host(),
            port: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
