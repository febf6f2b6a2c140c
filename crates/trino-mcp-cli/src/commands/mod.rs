//! CLI command implementations for the Trino MCP server.
//!
//! Every command starts from the same [`ServerConfig`]: the YAML file named
//! by `--config` (when present), with command-line flags and environment
//! variables layered on top.

pub mod check;
pub mod query;
pub mod serve;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{debug, warn};

use trino_mcp_core::{ServerConfig, Transport};

const DEFAULT_CONFIG_FILE: &str = "trino-mcp.yaml";

/// Flags shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path. Missing files are only an error when given explicitly.
    #[arg(short, long, global = true, env = "TRINO_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// MCP transport: stdio or sse. Overrides config file.
    #[arg(long, global = true, env = "MCP_TRANSPORT")]
    pub transport: Option<String>,

    /// Host for the SSE listener. Overrides config file.
    #[arg(long, global = true, env = "MCP_HOST")]
    pub host: Option<String>,

    /// Port for the SSE listener. Overrides config file.
    #[arg(long, global = true, env = "MCP_PORT")]
    pub port: Option<u16>,

    /// Verbose logging and debug details in tool results.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Start (true) or suppress (false) the direct HTTP query API.
    #[arg(long = "http-api", global = true)]
    pub http_api: Option<bool>,

    /// Port for the direct HTTP query API. Defaults to the MCP port plus one.
    #[arg(long = "http-api-port", global = true)]
    pub http_api_port: Option<u16>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Trino connection flags.
#[derive(Debug, Clone, Default, Args)]
pub struct EngineArgs {
    /// Trino coordinator host.
    #[arg(long, global = true, env = "TRINO_HOST")]
    pub trino_host: Option<String>,

    /// Trino coordinator port.
    #[arg(long, global = true, env = "TRINO_PORT")]
    pub trino_port: Option<u16>,

    /// Trino user.
    #[arg(long, global = true, env = "TRINO_USER")]
    pub trino_user: Option<String>,

    /// Trino password (enables basic authentication).
    #[arg(long, global = true, env = "TRINO_PASSWORD", hide_env_values = true)]
    pub trino_password: Option<String>,

    /// Default catalog for new sessions.
    #[arg(long, global = true, env = "TRINO_CATALOG")]
    pub trino_catalog: Option<String>,

    /// Default schema for new sessions.
    #[arg(long, global = true, env = "TRINO_SCHEMA")]
    pub trino_schema: Option<String>,

    /// http or https.
    #[arg(long, global = true, env = "TRINO_HTTP_SCHEME")]
    pub trino_http_scheme: Option<String>,
}

impl ConfigArgs {
    /// Load the configuration file and apply flag overrides.
    pub fn load(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    ServerConfig::from_file(&default_path)
                        .with_context(|| format!("Failed to load config file: {}", default_path.display()))?
                } else {
                    debug!(config = DEFAULT_CONFIG_FILE, "Config file not found, using defaults");
                    ServerConfig::default()
                }
            }
        };

        self.apply(&mut config)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Layer flags over `config`.
    pub fn apply(&self, config: &mut ServerConfig) -> Result<()> {
        if let Some(transport) = &self.transport {
            config.mcp.transport = transport
                .parse::<Transport>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Some(host) = &self.host {
            config.mcp.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(enabled) = self.http_api {
            config.http_api.enabled = Some(enabled);
        }
        if let Some(port) = self.http_api_port {
            config.http_api.port = Some(port);
        }

        let engine = &self.engine;
        if let Some(host) = &engine.trino_host {
            config.engine.host = host.clone();
        }
        if let Some(port) = engine.trino_port {
            config.engine.port = port;
        }
        if let Some(user) = &engine.trino_user {
            config.engine.user = user.clone();
        }
        if let Some(password) = &engine.trino_password {
            config.engine.password = Some(password.clone());
        }
        if let Some(catalog) = &engine.trino_catalog {
            if config.engine.catalog.as_deref() != Some(catalog.as_str()) && engine.trino_schema.is_none() {
                if config.engine.schema.is_some() {
                    warn!(catalog = %catalog, "Catalog overridden; dropping the configured default schema");
                }
                config.engine.schema = None;
            }
            config.engine.catalog = Some(catalog.clone());
        }
        if let Some(schema) = &engine.trino_schema {
            config.engine.schema = Some(schema.clone());
        }
        if let Some(scheme) = &engine.trino_http_scheme {
            config.engine.http_scheme = scheme.clone();
        }
        Ok(())
    }
}
