//! MCP server runner.
//!
//! Wires the configured transport, the optional direct HTTP facade, and the
//! shared engine together, and drives them until the client goes away or the
//! process is asked to stop.

use std::sync::Arc;

use axum::Router;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use trino_mcp_core::{ServerConfig, Transport};
use trino_mcp_engine::{ConnectionPool, QueryEngine, TrinoEngine};

use crate::dispatcher::Dispatcher;
use crate::error::McpError;
use crate::http_api::{self, HttpApiState};
use crate::protocol::ServerInfo;
use crate::session::{Session, SessionOptions};
use crate::sse::{self, SseState};
use crate::stdio;
use crate::tools::ToolRegistry;

/// The MCP server.
pub struct McpServer {
    config: ServerConfig,
    engine: Arc<dyn QueryEngine>,
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    /// Create a server over an existing engine.
    pub fn new(config: ServerConfig, engine: Arc<dyn QueryEngine>) -> Self {
        let registry = Arc::new(ToolRegistry::builtin());
        Self {
            config,
            engine,
            dispatcher: Arc::new(Dispatcher::new(registry)),
        }
    }

    /// Create a server talking to the Trino coordinator named in `config`.
    pub fn from_config(config: ServerConfig) -> Result<Self, McpError> {
        let engine = TrinoEngine::new(config.engine.clone())?;
        Ok(Self::new(config, Arc::new(engine)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            server_info: ServerInfo::new(&self.config.name, &self.config.version),
            shutdown_grace: self.config.session.shutdown_grace(),
            max_override_connections: self.config.session.max_override_connections,
            debug: self.config.debug,
        }
    }

    /// A fresh session with its own id.
    pub fn new_session(&self) -> Arc<Session> {
        Arc::new(Session::new(
            uuid::Uuid::new_v4().to_string(),
            Arc::clone(&self.engine),
            Arc::clone(&self.dispatcher),
            &self.session_options(),
        ))
    }

    /// State and router for the SSE transport.
    pub fn sse_router(&self, shutdown: CancellationToken) -> (Router, Arc<SseState>) {
        let state = Arc::new(SseState::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.dispatcher),
            self.session_options(),
            shutdown,
        ));
        (sse::create_router(Arc::clone(&state)), state)
    }

    /// Pool and router for the direct HTTP facade.
    pub fn http_api_router(&self, shutdown: CancellationToken) -> (Router, ConnectionPool) {
        let pool = ConnectionPool::new(
            Arc::clone(&self.engine),
            self.config.engine.pool.max_idle_per_target,
        );
        let router = http_api::create_router(HttpApiState::new(pool.clone(), shutdown));
        (router, pool)
    }

    /// Run until the transport ends or Ctrl-C is pressed.
    pub async fn run(&self) -> Result<(), McpError> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
            }
            signal.cancel();
        });
        self.run_until(shutdown).await
    }

    /// Run until the transport ends or `shutdown` is cancelled.
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<(), McpError> {
        let facade = if self.config.http_api_enabled() {
            Some(self.start_http_api(shutdown.clone()).await?)
        } else {
            None
        };

        let outcome = match self.config.mcp.transport {
            Transport::Stdio => {
                self.run_stdio(shutdown.clone()).await;
                Ok(())
            }
            Transport::Sse => self.run_sse(shutdown.clone()).await,
        };

        shutdown.cancel();
        if let Some((handle, pool)) = facade {
            if let Err(e) = handle.await {
                error!(error = %e, "HTTP API task failed");
            }
            pool.close_all().await;
        }

        info!("MCP server stopped");
        outcome
    }

    async fn run_stdio(&self, shutdown: CancellationToken) {
        info!(
            name = %self.config.name,
            tools = self.registry().len(),
            "Starting MCP server with stdio transport"
        );
        let session = self.new_session();
        let exit = stdio::serve(
            session,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown,
        )
        .await;
        info!(?exit, "Stdio transport finished");
    }

    async fn run_sse(&self, shutdown: CancellationToken) -> Result<(), McpError> {
        let addr = self.config.mcp.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| McpError::StartupFailed(format!("Failed to bind to {addr}: {e}")))?;
        info!(
            addr = %addr,
            tools = self.registry().len(),
            "Starting MCP server with SSE transport"
        );

        let (app, state) = self.sse_router(shutdown.clone());
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(|e| McpError::TransportError(e.to_string()));

        shutdown.cancel();
        state.wait_closed().await;
        result
    }

    async fn start_http_api(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(JoinHandle<()>, ConnectionPool), McpError> {
        let addr = format!("{}:{}", self.config.http_api.host, self.config.http_api_port());
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| McpError::StartupFailed(format!("Failed to bind HTTP API to {addr}: {e}")))?;
        info!(addr = %addr, "HTTP API listening");

        let (app, pool) = self.http_api_router(shutdown.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "HTTP API server failed");
            }
        });
        Ok((handle, pool))
    }
}
