//! Per-session state.
//!
//! A [`SessionContext`] owns the session's engine connections: one primary
//! connection bound to the configured catalog/schema, plus a small cache of
//! connections for per-call overrides. None of them are ever shared with
//! another session.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};
use trino_mcp_engine::{ConnectionTarget, EngineConnection, EngineError, QueryEngine};

/// Everything a tool handler may touch.
pub struct SessionContext {
    session_id: String,
    engine: Arc<dyn QueryEngine>,
    default_target: ConnectionTarget,
    primary: Option<Arc<dyn EngineConnection>>,
    overrides: VecDeque<Arc<dyn EngineConnection>>,
    max_overrides: usize,
    debug: bool,
    initialized: bool,
    closed: bool,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        engine: Arc<dyn QueryEngine>,
        max_overrides: usize,
        debug: bool,
    ) -> Self {
        let default_target = engine.default_target();
        Self {
            session_id: session_id.into(),
            engine,
            default_target,
            primary: None,
            overrides: VecDeque::new(),
            max_overrides: max_overrides.max(1),
            debug,
            initialized: false,
            closed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Catalog/schema used when a call does not override them.
    pub fn default_target(&self) -> &ConnectionTarget {
        &self.default_target
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn max_rows(&self) -> usize {
        self.engine.max_rows()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Open the primary connection if it is not open yet.
    pub async fn connect_primary(&mut self) -> Result<Arc<dyn EngineConnection>, EngineError> {
        if self.closed {
            return Err(EngineError::Connection("session is closed".to_string()));
        }
        if let Some(conn) = &self.primary
            && !conn.is_closed()
        {
            return Ok(Arc::clone(conn));
        }

        let conn = self.engine.connect(&self.default_target).await?;
        info!(
            session_id = %self.session_id,
            catalog = ?self.default_target.catalog,
            schema = ?self.default_target.schema,
            "Engine connection opened"
        );
        self.primary = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// A connection configured for `target`, opened on demand.
    ///
    /// Override connections are kept most-recently-used last; when the cache
    /// is full the oldest one is closed.
    pub async fn connection_for(&mut self, target: &ConnectionTarget) -> Result<Arc<dyn EngineConnection>, EngineError> {
        if *target == self.default_target {
            return self.connect_primary().await;
        }
        if self.closed {
            return Err(EngineError::Connection("session is closed".to_string()));
        }

        self.overrides.retain(|c| !c.is_closed());
        if let Some(pos) = self.overrides.iter().position(|c| c.target() == target)
            && let Some(conn) = self.overrides.remove(pos)
        {
            self.overrides.push_back(Arc::clone(&conn));
            return Ok(conn);
        }

        let conn = self.engine.connect(target).await?;
        debug!(
            session_id = %self.session_id,
            catalog = ?target.catalog,
            schema = ?target.schema,
            "Override connection opened"
        );
        self.overrides.push_back(Arc::clone(&conn));
        while self.overrides.len() > self.max_overrides {
            if let Some(evicted) = self.overrides.pop_front() {
                debug!(session_id = %self.session_id, evicted = %evicted.target(), "Evicting override connection");
                evicted.close().await;
            }
        }
        Ok(conn)
    }

    /// Close and forget the connection for `target`, so the next call reconnects.
    pub async fn discard(&mut self, target: &ConnectionTarget) {
        if *target == self.default_target {
            if let Some(conn) = self.primary.take() {
                warn!(session_id = %self.session_id, "Dropping failed engine connection");
                conn.close().await;
            }
            return;
        }
        if let Some(pos) = self.overrides.iter().position(|c| c.target() == target)
            && let Some(conn) = self.overrides.remove(pos)
        {
            conn.close().await;
        }
    }

    /// Close every connection. Later requests for a connection fail.
    pub async fn close_all(&mut self) {
        self.closed = true;
        let mut count = 0;
        if let Some(conn) = self.primary.take() {
            conn.close().await;
            count += 1;
        }
        for conn in self.overrides.drain(..) {
            conn.close().await;
            count += 1;
        }
        debug!(session_id = %self.session_id, count, "Closed session connections");
    }

    /// Number of connections currently held open.
    pub fn open_connections(&self) -> usize {
        self.primary.iter().filter(|c| !c.is_closed()).count()
            + self.overrides.iter().filter(|c| !c.is_closed()).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
