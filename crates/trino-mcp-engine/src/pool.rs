//! Keyed connection pool.
//!
//! Connections are bound to a catalog/schema at open time, so the pool keeps
//! idle connections per [`ConnectionTarget`]. A checkout returns a
//! [`PooledConnection`] guard that hands the connection back on drop, unless
//! a connection-level failure poisoned it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineError;
use crate::result::QueryResult;
use crate::{ConnectionTarget, EngineConnection, QueryEngine};

type Idle = HashMap<ConnectionTarget, Vec<Arc<dyn EngineConnection>>>;

/// Pool of engine connections keyed by catalog/schema.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    engine: Arc<dyn QueryEngine>,
    idle: Mutex<Idle>,
    max_idle_per_target: usize,
}

impl ConnectionPool {
    pub fn new(engine: Arc<dyn QueryEngine>, max_idle_per_target: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                engine,
                idle: Mutex::new(HashMap::new()),
                max_idle_per_target,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.inner.engine
    }

    /// Take an idle connection for `target`, or open a new one.
    pub async fn checkout(&self, target: &ConnectionTarget) -> Result<PooledConnection, EngineError> {
        let reused = {
            let mut idle = self.inner.lock();
            idle.get_mut(target).and_then(|conns| {
                while let Some(conn) = conns.pop() {
                    if !conn.is_closed() {
                        return Some(conn);
                    }
                }
                None
            })
        };

        let conn = match reused {
            Some(conn) => {
                debug!(connection_target = %target, "Reusing pooled connection");
                conn
            }
            None => self.inner.engine.connect(target).await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Number of idle connections held for `target`.
    pub fn idle_count(&self, target: &ConnectionTarget) -> usize {
        self.inner.lock().get(target).map_or(0, Vec::len)
    }

    /// Close and forget every idle connection.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.inner.lock().drain().flat_map(|(_, conns)| conns).collect();
        let count = drained.len();
        for conn in drained {
            conn.close().await;
        }
        if count > 0 {
            debug!(count, "Closed idle pooled connections");
        }
    }
}

impl PoolInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Idle> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkin(&self, conn: Arc<dyn EngineConnection>) {
        if conn.is_closed() {
            return;
        }
        let mut idle = self.lock();
        let slot = idle.entry(conn.target().clone()).or_default();
        if slot.len() < self.max_idle_per_target {
            slot.push(conn);
        } else {
            drop(idle);
            close_detached(conn);
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    conn: Option<Arc<dyn EngineConnection>>,
    pool: Arc<PoolInner>,
    poisoned: AtomicBool,
}

impl PooledConnection {
    /// Run a statement, poisoning the checkout on connection-level failure.
    pub async fn execute(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult, EngineError> {
        let Some(conn) = &self.conn else {
            return Err(EngineError::Connection("connection already returned".to_string()));
        };
        let result = conn.execute(sql, cancel).await;
        if let Err(e) = &result
            && e.poisons_connection()
        {
            self.poison();
        }
        result
    }

    /// Discard the connection instead of returning it to the pool.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub fn target(&self) -> Option<&ConnectionTarget> {
        self.conn.as_ref().map(|c| c.target())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.poisoned.load(Ordering::SeqCst) {
            debug!(connection_target = %conn.target(), "Discarding poisoned connection");
            close_detached(conn);
        } else {
            self.pool.checkin(conn);
        }
    }
}

/// Close a connection from synchronous code.
fn close_detached(conn: Arc<dyn EngineConnection>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { conn.close().await });
    }
}
