//! Trino coordinator configuration.
//!
//! Catalog and schema here are the session defaults. They are applied as
//! connection-level parameters when a connection is opened, never through
//! `USE` statements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for the downstream Trino connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hostname of the Trino coordinator.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the Trino coordinator.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User reported to Trino in `X-Trino-User`.
    #[serde(default = "default_user")]
    pub user: String,

    /// Password for basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Default catalog for new sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    /// Default schema for new sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// "http" or "https".
    #[serde(default = "default_http_scheme")]
    pub http_scheme: String,

    /// Value of `X-Trino-Source`.
    #[serde(default = "default_source")]
    pub source: String,

    /// Attempts per coordinator request while it answers 503.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for a single HTTP round trip.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Timeout for a whole query, across all result pages.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_seconds: u64,

    /// Row cap for a single result; larger results are truncated.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_headers: BTreeMap<String, String>,

    /// Connection pool used by the direct HTTP facade.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            password_env: None,
            catalog: None,
            schema: None,
            http_scheme: default_http_scheme(),
            source: default_source(),
            max_attempts: default_max_attempts(),
            request_timeout_seconds: default_request_timeout(),
            query_timeout_seconds: default_query_timeout(),
            max_rows: default_max_rows(),
            http_headers: BTreeMap::new(),
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle connections kept per (catalog, schema) pair.
    #[serde(default = "default_max_idle_per_target")]
    pub max_idle_per_target: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_target: default_max_idle_per_target(),
        }
    }
}

impl EngineConfig {
    /// Base URL of the coordinator, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.http_scheme, self.host, self.port)
    }

    /// Get the password, checking password_env first.
    pub fn get_password(&self) -> Option<String> {
        if let Some(env_var) = &self.password_env
            && let Ok(password) = std::env::var(env_var)
        {
            return Some(password);
        }
        self.password.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_user() -> String {
    "trino".to_string()
}

fn default_http_scheme() -> String {
    "http".to_string()
}

fn default_source() -> String {
    "trino-mcp".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    300
}

fn default_max_rows() -> usize {
    10_000
}

fn default_max_idle_per_target() -> usize {
    4
}
