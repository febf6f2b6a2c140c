//! `trino-mcp serve` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use trino_mcp_server::McpServer;

use super::ConfigArgs;

/// Arguments for `trino-mcp serve`.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Server name reported during protocol negotiation. Overrides config file.
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute(config_args: &ConfigArgs, args: ServeArgs) -> Result<()> {
    let mut config = config_args.load()?;
    if let Some(name) = args.name {
        config.name = name;
    }

    info!(
        transport = ?config.mcp.transport,
        trino = %config.engine.base_url(),
        user = %config.engine.user,
        catalog = ?config.engine.catalog,
        schema = ?config.engine.schema,
        http_api = config.http_api_enabled(),
        "Starting Trino MCP server"
    );

    let server = McpServer::from_config(config).context("Failed to create MCP server")?;
    server.run().await.context("MCP server failed")?;
    Ok(())
}
