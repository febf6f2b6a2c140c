//! `trino-mcp query` command implementation.
//!
//! Runs one statement through the same engine adapter the server uses, which
//! makes it handy for checking connectivity and coercion from a shell.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use trino_mcp_engine::{EngineConnection, QueryEngine, QueryRequest, TrinoEngine};
use trino_mcp_server::http_api::format_results;

use super::ConfigArgs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// The structured result as JSON.
    Json,
}

/// Arguments for `trino-mcp query`.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// SQL statement to run.
    pub sql: String,

    /// Catalog for this statement only.
    #[arg(long)]
    pub catalog: Option<String>,

    /// Schema for this statement only.
    #[arg(long)]
    pub schema: Option<String>,

    /// Run EXPLAIN on the statement instead.
    #[arg(long)]
    pub explain: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub async fn execute(config_args: &ConfigArgs, args: QueryArgs) -> Result<()> {
    let config = config_args.load()?;
    let engine = TrinoEngine::new(config.engine).context("Failed to create Trino client")?;

    let sql = if args.explain {
        format!("EXPLAIN {}", args.sql)
    } else {
        args.sql
    };
    let request = QueryRequest {
        sql,
        catalog: args.catalog,
        schema: args.schema,
    };
    request.validate().context("Invalid query")?;
    let target = request
        .resolve_target(&engine.default_target())
        .context("Invalid catalog/schema")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    debug!(connection_target = %target, "Connecting to Trino");
    let conn = engine.connect(&target).await.context("Failed to connect to Trino")?;
    let result = conn.execute(&request.sql, &cancel).await;
    conn.close().await;
    let result = result.context("Query failed")?;

    info!(
        query_id = ?result.query_id,
        rows = result.row_count,
        truncated = result.truncated,
        elapsed_ms = result.query_time_ms,
        "Query finished"
    );
    match args.format {
        OutputFormat::Table => println!("{}", format_results(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}
