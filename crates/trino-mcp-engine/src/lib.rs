//! # trino-mcp-engine
//!
//! Query engine adapter for the Trino MCP server.
//!
//! This crate speaks the Trino client REST protocol and exposes it through
//! two traits:
//!
//! - [`QueryEngine`]: opens connections bound to a [`ConnectionTarget`] and
//!   pings the coordinator.
//! - [`EngineConnection`]: runs SQL and returns a [`QueryResult`] whose values
//!   are already coerced to JSON-safe shapes.
//!
//! The server crate only depends on the traits, so tests can substitute an
//! in-memory engine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod client;
pub mod error;
pub mod metadata;
pub mod pool;
pub mod result;
pub mod types;
mod wire;

pub use client::{TrinoConnection, TrinoEngine};
pub use error::{EngineError, QueryErrorKind};
pub use pool::{ConnectionPool, PooledConnection};
pub use result::{ColumnInfo, QueryRequest, QueryResult, RequestError};
pub use types::{EngineType, coerce, coerce_row};

/// The catalog and schema a connection is bound to.
///
/// Either part may be absent; queries then need fully qualified names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ConnectionTarget {
    pub fn new(catalog: Option<String>, schema: Option<String>) -> Self {
        Self { catalog, schema }
    }

    /// Apply per-request overrides on top of `self` as the defaults.
    ///
    /// A catalog override without a schema drops the default schema unless
    /// the catalog is the default one, since that schema belongs to the
    /// default catalog. A schema override alone needs a default catalog.
    pub fn with_overrides(&self, catalog: Option<&str>, schema: Option<&str>) -> Result<Self, RequestError> {
        match (catalog, schema) {
            (Some(catalog), schema) => Ok(Self {
                catalog: Some(catalog.to_string()),
                schema: schema.map(str::to_string).or_else(|| {
                    if self.catalog.as_deref() == Some(catalog) {
                        self.schema.clone()
                    } else {
                        None
                    }
                }),
            }),
            (None, Some(schema)) => {
                if self.catalog.is_none() {
                    return Err(RequestError::SchemaWithoutCatalog);
                }
                Ok(Self {
                    catalog: self.catalog.clone(),
                    schema: Some(schema.to_string()),
                })
            }
            (None, None) => Ok(self.clone()),
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.catalog, &self.schema) {
            (Some(catalog), Some(schema)) => write!(f, "{catalog}.{schema}"),
            (Some(catalog), None) => write!(f, "{catalog}"),
            (None, Some(schema)) => write!(f, "?.{schema}"),
            (None, None) => write!(f, "<none>"),
        }
    }
}

/// What the coordinator reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub node_version: Option<String>,
    pub environment: Option<String>,
    pub starting: bool,
}

/// An open connection to the engine, bound to one [`ConnectionTarget`].
///
/// Implementations must be safe to share between tasks. A closed connection
/// rejects further queries with [`EngineError::Connection`].
#[async_trait]
pub trait EngineConnection: Send + Sync + fmt::Debug {
    /// The catalog/schema this connection was opened with.
    fn target(&self) -> &ConnectionTarget;

    /// Run one statement to completion (or until the row cap), honoring
    /// `cancel`. A cancelled query is also cancelled on the engine.
    async fn execute(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult, EngineError>;

    /// Close the connection. Calling this more than once is harmless.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory for engine connections.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Open a connection bound to `target`.
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn EngineConnection>, EngineError>;

    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<EngineInfo, EngineError>;

    /// The target new sessions start with.
    fn default_target(&self) -> ConnectionTarget;

    /// Row cap applied to every result.
    fn max_rows(&self) -> usize;
}
