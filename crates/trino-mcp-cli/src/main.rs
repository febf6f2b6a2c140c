mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConfigArgs, check, query, serve};

#[derive(Parser, Debug)]
#[command(
    name = "trino-mcp",
    version,
    about = "MCP server exposing a Trino coordinator as tools for AI clients"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (the default when no command is given).
    Serve(serve::ServeArgs),

    /// Run one SQL statement against Trino and print the result.
    Query(query::QueryArgs),

    /// Validate the configuration and check that Trino is reachable.
    Check(check::CheckArgs),
}

/// Install the tracing subscriber. Logs go to stderr so stdout stays a clean
/// protocol channel for the stdio transport.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.config.debug);

    match cli.cmd {
        None => serve::execute(&cli.config, serve::ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve::execute(&cli.config, args).await,
        Some(Command::Query(args)) => query::execute(&cli.config, args).await,
        Some(Command::Check(args)) => check::execute(&cli.config, args).await,
    }
}
