//! Trino REST client.
//!
//! Provides [`TrinoEngine`], the [`QueryEngine`] backed by a Trino coordinator,
//! and [`TrinoConnection`], a connection bound to one catalog/schema.
//!
//! A statement is submitted with `POST /v1/statement` and its results are
//! paged in by following `nextUri` until the coordinator stops returning one.
//! Catalog and schema travel as `X-Trino-Catalog` / `X-Trino-Schema` headers
//! on every request of the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trino_mcp_core::EngineConfig;

use crate::error::EngineError;
use crate::result::{ColumnInfo, QueryResult};
use crate::types::{EngineType, coerce_row};
use crate::wire::{QueryResults, ServerInfo};
use crate::{ConnectionTarget, EngineConnection, EngineInfo, QueryEngine};

const HEADER_USER: &str = "X-Trino-User";
const HEADER_SOURCE: &str = "X-Trino-Source";
const HEADER_CATALOG: &str = "X-Trino-Catalog";
const HEADER_SCHEMA: &str = "X-Trino-Schema";

/// First delay between attempts while the coordinator answers 503.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Query engine talking to a Trino coordinator over HTTP.
#[derive(Debug, Clone)]
pub struct TrinoEngine {
    http: Arc<HttpClient>,
}

impl TrinoEngine {
    /// Build the engine from configuration. No request is made until the
    /// first [`QueryEngine::connect`] or [`QueryEngine::ping`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EngineError::Connection(format!("failed to build HTTP client: {e}")))?;

        info!(
            url = %config.base_url(),
            user = %config.user,
            catalog = ?config.catalog,
            schema = ?config.schema,
            "Trino engine configured"
        );

        Ok(Self {
            http: Arc::new(HttpClient { client, config }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.http.config
    }
}

#[async_trait]
impl QueryEngine for TrinoEngine {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn EngineConnection>, EngineError> {
        let info = self.ping().await?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

        debug!(
            connection_id = id,
            catalog = ?target.catalog,
            schema = ?target.schema,
            node_version = ?info.node_version,
            "Opened Trino connection"
        );

        Ok(Arc::new(TrinoConnection {
            inner: Arc::new(ConnectionInner {
                id,
                http: Arc::clone(&self.http),
                target: target.clone(),
                closed: AtomicBool::new(false),
            }),
        }))
    }

    async fn ping(&self) -> Result<EngineInfo, EngineError> {
        let url = format!("{}/v1/info", self.http.config.base_url());
        let info: ServerInfo = self
            .http
            .send_with_retry(None, || self.http.client.get(&url))
            .await?;
        Ok(info.into())
    }

    fn default_target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.http.config.catalog.clone(), self.http.config.schema.clone())
    }

    fn max_rows(&self) -> usize {
        self.http.config.max_rows
    }
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HttpClient {
    client: reqwest::Client,
    config: EngineConfig,
}

impl HttpClient {
    /// Attach identity, auth, and session headers.
    fn decorate(&self, builder: reqwest::RequestBuilder, target: Option<&ConnectionTarget>) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header(HEADER_USER, &self.config.user)
            .header(HEADER_SOURCE, &self.config.source);

        if let Some(target) = target {
            if let Some(catalog) = &target.catalog {
                builder = builder.header(HEADER_CATALOG, catalog);
            }
            if let Some(schema) = &target.schema {
                builder = builder.header(HEADER_SCHEMA, schema);
            }
        }

        for (name, value) in &self.config.http_headers {
            builder = builder.header(name, value);
        }

        if let Some(password) = self.config.get_password() {
            builder = builder.basic_auth(&self.config.user, Some(password));
        }

        builder
    }

    /// Send a request, retrying with exponential backoff while the
    /// coordinator answers 503, and decode the JSON body.
    async fn send_with_retry<T, F>(&self, target: Option<&ConnectionTarget>, build: F) -> Result<T, EngineError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let response = self.decorate(build(), target).send().await?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| EngineError::Protocol(format!("invalid response body: {e}")));
            }

            match status {
                StatusCode::SERVICE_UNAVAILABLE if attempt < max_attempts => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, max_attempts, ?delay, "Coordinator unavailable, retrying");
                    tokio::time::sleep(delay).await;
                }
                StatusCode::SERVICE_UNAVAILABLE => {
                    return Err(EngineError::Connection(format!(
                        "coordinator unavailable after {attempt} attempts"
                    )));
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(EngineError::Connection(format!(
                        "coordinator rejected credentials for user '{}' ({status})",
                        self.config.user
                    )));
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(EngineError::Protocol(format!("HTTP {status}: {}", body.trim())));
                }
            }
        }
    }

    /// Ask the coordinator to stop a query. Failures are only logged; the
    /// query is abandoned either way.
    async fn cancel_remote(&self, next_uri: &str, target: &ConnectionTarget) {
        let request = self.decorate(self.client.delete(next_uri), Some(target));
        match request.send().await {
            Ok(response) => debug!(status = %response.status(), "Cancelled query on coordinator"),
            Err(e) => warn!(error = %e, "Failed to cancel query on coordinator"),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A Trino connection bound to one catalog/schema.
///
/// The HTTP client underneath is shared; what a connection owns is its
/// session headers and its open/closed state.
#[derive(Debug)]
pub struct TrinoConnection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    id: u64,
    http: Arc<HttpClient>,
    target: ConnectionTarget,
    closed: AtomicBool,
}

#[async_trait]
impl EngineConnection for TrinoConnection {
    fn target(&self) -> &ConnectionTarget {
        &self.inner.target
    }

    async fn execute(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Connection("connection is closed".to_string()));
        }

        // The query runs on its own task so page fetching never stalls the
        // caller's loop. If the caller goes away, the guard cancels the token
        // and the worker cancels the query on the coordinator.
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let token = cancel.clone();
        let worker = tokio::spawn(async move { inner.run(&sql, &token).await });

        let guard = cancel.clone().drop_guard();
        let result = worker
            .await
            .map_err(|e| EngineError::Protocol(format!("query worker failed: {e}")));
        guard.disarm();
        result?
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(connection_id = self.inner.id, "Closed Trino connection");
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl ConnectionInner {
    async fn run(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult, EngineError> {
        let config = &self.http.config;
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + config.query_timeout();
        let statement_url = format!("{}/v1/statement", config.base_url());

        let submit = self
            .http
            .send_with_retry::<QueryResults, _>(Some(&self.target), || {
                self.http.client.post(&statement_url).body(sql.to_string())
            });
        let mut page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(self.timed_out()),
            page = submit => page?,
        };

        let query_id = page.id.clone();
        debug!(
            connection_id = self.id,
            query_id = %query_id,
            state = page.stats.as_ref().map(|s| s.state.as_str()).unwrap_or("UNKNOWN"),
            "Query submitted"
        );

        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut types: Vec<EngineType> = Vec::new();
        let mut rows = Vec::new();
        let mut truncated = false;

        loop {
            if let Some(error) = page.error.take() {
                debug!(
                    query_id = %query_id,
                    error_name = ?error.error_name,
                    error_code = ?error.error_code,
                    state = page.stats.as_ref().map(|s| s.state.as_str()).unwrap_or("UNKNOWN"),
                    "Query failed"
                );
                return Err(error.into_engine_error(&query_id));
            }

            if columns.is_empty()
                && let Some(page_columns) = page.columns.take()
            {
                types = page_columns.iter().map(|c| EngineType::parse(&c.declared_type)).collect();
                columns = page_columns
                    .into_iter()
                    .map(|c| ColumnInfo {
                        name: c.name,
                        declared_type: c.declared_type,
                    })
                    .collect();
            }

            for row in page.data.take().unwrap_or_default() {
                if rows.len() >= config.max_rows {
                    truncated = true;
                    break;
                }
                rows.push(coerce_row(row, &types));
            }

            let Some(next_uri) = page.next_uri.take() else {
                break;
            };

            if truncated {
                info!(query_id = %query_id, max_rows = config.max_rows, "Row cap reached, cancelling remainder");
                self.http.cancel_remote(&next_uri, &self.target).await;
                break;
            }

            let fetch = self
                .http
                .send_with_retry::<QueryResults, _>(Some(&self.target), || self.http.client.get(&next_uri));
            page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.http.cancel_remote(&next_uri, &self.target).await;
                    return Err(EngineError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.http.cancel_remote(&next_uri, &self.target).await;
                    return Err(self.timed_out());
                }
                page = fetch => page?,
            };
        }

        let row_count = rows.len();
        let query_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            connection_id = self.id,
            query_id = %query_id,
            row_count,
            truncated,
            query_time_ms,
            "Query finished"
        );

        Ok(QueryResult {
            query_id: Some(query_id),
            columns,
            rows,
            row_count,
            truncated,
            query_time_ms,
        })
    }

    fn timed_out(&self) -> EngineError {
        EngineError::Timeout(format!(
            "query exceeded {}s",
            self.http.config.query_timeout_seconds
        ))
    }
}
