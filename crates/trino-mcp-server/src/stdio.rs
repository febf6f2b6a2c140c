//! Duplex (stdio) transport.
//!
//! Newline-delimited JSON in, at most one response per message out, strictly
//! in order. The loop serves exactly one session; end of input, a read error,
//! a write error, a client `shutdown`, or server shutdown all end it, and the
//! session is torn down before returning.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::McpError;
use crate::protocol::JsonRpcResponse;
use crate::session::Session;

/// Why the stdio loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioExit {
    EndOfInput,
    ClientShutdown,
    ServerShutdown,
    TransportError,
}

/// Serve `session` over a reader/writer pair until either side is done.
pub async fn serve<R, W>(
    session: Arc<Session>,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> StdioExit
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(session_id = %session.id(), "Serving MCP over stdio");
    let mut lines = reader.lines();

    let exit = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break StdioExit::ServerShutdown,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break StdioExit::EndOfInput,
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "Failed to read from stdin");
                break StdioExit::TransportError;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut task = session.spawn_message(line);
        let response = tokio::select! {
            _ = shutdown.cancelled() => break StdioExit::ServerShutdown,
            joined = &mut task => joined,
        };

        match response {
            Ok(Some(response)) => {
                if let Err(e) = write_response(&mut writer, &response).await {
                    warn!(session_id = %session.id(), error = %e, "Failed to write response");
                    break StdioExit::TransportError;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "Message handler failed");
            }
        }

        if session.is_close_requested() {
            break StdioExit::ClientShutdown;
        }
    };

    debug!(session_id = %session.id(), ?exit, "Stdio loop finished");
    session.teardown().await;
    exit
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}
