//! # trino-mcp-core
//!
//! Types shared by every Trino MCP crate: the server configuration tree and
//! the identifier rules applied to catalog and schema names.

pub mod config;

use regex::Regex;
use std::sync::LazyLock;

pub use config::{
    ConfigError, EngineConfig, HttpApiConfig, McpConfig, PoolConfig, ServerConfig, SessionConfig,
    Transport,
};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Check whether `name` is a plain SQL identifier usable as a catalog,
/// schema, or table name.
///
/// Quoted identifiers are not accepted; names are always re-quoted by the
/// engine adapter before they reach SQL text.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}
