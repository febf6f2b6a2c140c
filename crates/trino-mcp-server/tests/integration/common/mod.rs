//! Shared test infrastructure for the server integration tests.
//!
//! This module provides:
//! - An in-memory [`FakeEngine`] that answers a handful of known statements
//! - Server and session fixtures wired to it
//! - Helpers for building requests and reading tool results

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use trino_mcp_core::ServerConfig;
use trino_mcp_engine::{
    ColumnInfo, ConnectionTarget, EngineConnection, EngineError, EngineInfo, QueryEngine,
    QueryErrorKind, QueryResult,
};
use trino_mcp_server::{JsonRpcRequest, JsonRpcResponse, McpServer, Session};

// =============================================================================
// FAKE ENGINE
// =============================================================================

/// Rows produced by `SELECT * FROM big`.
pub const BIG_TABLE_ROWS: usize = 25;

/// Statement that blocks until cancelled.
pub const SLOW_QUERY: &str = "SELECT * FROM slow";

/// Schema whose table listing overflows the row cap.
pub const WIDE_SCHEMA: &str = "wide";

/// Statement that returns the connection's own catalog and schema.
pub const TARGET_QUERY: &str = "SELECT current_target";

#[derive(Debug, Default)]
pub struct EngineStats {
    pub connects: AtomicUsize,
    pub open: AtomicUsize,
    pub executed: Mutex<Vec<(ConnectionTarget, String)>>,
    pub cancelled: AtomicUsize,
}

/// Query engine that never leaves the process.
#[derive(Debug)]
pub struct FakeEngine {
    defaults: ConnectionTarget,
    max_rows: usize,
    reachable: AtomicBool,
    pub stats: Arc<EngineStats>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            defaults: ConnectionTarget::new(Some("memory".to_string()), Some("bullshit".to_string())),
            max_rows: 10,
            reachable: AtomicBool::new(true),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Make `connect` and `ping` fail until turned back on.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn open_connections(&self) -> usize {
        self.stats.open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.stats.cancelled.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<(ConnectionTarget, String)> {
        self.stats.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for FakeEngine {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn EngineConnection>, EngineError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(EngineError::Connection("connection refused".to_string()));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.stats.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            target: target.clone(),
            max_rows: self.max_rows,
            closed: AtomicBool::new(false),
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn ping(&self) -> Result<EngineInfo, EngineError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(EngineError::Connection("connection refused".to_string()));
        }
        Ok(EngineInfo {
            node_version: Some("476".to_string()),
            environment: Some("test".to_string()),
            starting: false,
        })
    }

    fn default_target(&self) -> ConnectionTarget {
        self.defaults.clone()
    }

    fn max_rows(&self) -> usize {
        self.max_rows
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    target: ConnectionTarget,
    max_rows: usize,
    closed: AtomicBool,
    stats: Arc<EngineStats>,
}

fn column(name: &str, declared_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        declared_type: declared_type.to_string(),
    }
}

fn rows_of(values: &[&str]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![json!(v)]).collect()
}

fn result(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> QueryResult {
    QueryResult {
        query_id: Some("20260101_000000_00001_fake1".to_string()),
        row_count: rows.len(),
        columns,
        rows,
        truncated: false,
        query_time_ms: 1,
    }
}

#[async_trait]
impl EngineConnection for FakeConnection {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn execute(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Connection("connection is closed".to_string()));
        }
        self.stats
            .executed
            .lock()
            .unwrap()
            .push((self.target.clone(), sql.to_string()));

        let sql = sql.trim();
        if sql == SLOW_QUERY {
            return tokio::select! {
                _ = cancel.cancelled() => {
                    self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Cancelled)
                }
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(result(vec![], vec![])),
            };
        }
        if sql.starts_with("SELECT FROM") {
            return Err(EngineError::Query {
                message: "line 1:8: mismatched input 'FROM'. Expecting: '*', <expression>".to_string(),
                kind: QueryErrorKind::Syntax,
                error_name: Some("SYNTAX_ERROR".to_string()),
                query_id: Some("20260101_000000_00002_fake1".to_string()),
            });
        }

        match sql {
            "SELECT 1 AS test" => Ok(result(vec![column("test", "integer")], vec![vec![json!(1)]])),
            TARGET_QUERY => Ok(result(
                vec![column("catalog", "varchar"), column("schema", "varchar")],
                vec![vec![json!(self.target.catalog), json!(self.target.schema)]],
            )),
            "SELECT * FROM big" => {
                let rows: Vec<Vec<Value>> = (0..BIG_TABLE_ROWS as i64).map(|i| vec![json!(i)]).collect();
                let truncated = rows.len() > self.max_rows;
                let mut result = result(vec![column("n", "bigint")], rows);
                result.rows.truncate(self.max_rows);
                result.row_count = result.rows.len();
                result.truncated = truncated;
                Ok(result)
            }
            "SHOW CATALOGS" => Ok(result(
                vec![column("Catalog", "varchar")],
                rows_of(&["memory", "system", "tpch"]),
            )),
            _ if sql.starts_with("SHOW SCHEMAS FROM") => Ok(result(
                vec![column("Schema", "varchar")],
                rows_of(&["bullshit", "default", "information_schema"]),
            )),
            _ if sql.starts_with("SHOW TABLES FROM") && sql.ends_with(&format!("\"{WIDE_SCHEMA}\"")) => {
                let names: Vec<String> = (0..self.max_rows).map(|i| format!("t{i}")).collect();
                let mut result = result(
                    vec![column("Table", "varchar")],
                    names.iter().map(|n| vec![json!(n)]).collect(),
                );
                result.truncated = true;
                Ok(result)
            }
            _ if sql.starts_with("SHOW TABLES FROM") => Ok(result(
                vec![column("Table", "varchar")],
                rows_of(&["real_bullshit_data"]),
            )),
            _ if sql.starts_with("DESCRIBE") => Ok(result(
                vec![
                    column("Column", "varchar"),
                    column("Type", "varchar"),
                    column("Extra", "varchar"),
                    column("Comment", "varchar"),
                ],
                vec![
                    vec![json!("id"), json!("bigint"), json!(""), json!("")],
                    vec![json!("bullshit_score"), json!("double"), json!(""), json!("how bad")],
                ],
            )),
            _ if sql.starts_with("CALL system.runtime.kill_query") => Ok(result(vec![], vec![])),
            _ if sql.starts_with("EXPLAIN") => Ok(result(
                vec![column("Query Plan", "varchar")],
                rows_of(&["Fragment 0 [SINGLE]"]),
            )),
            _ => Err(EngineError::Query {
                message: format!("Unsupported statement in fake engine: {sql}"),
                kind: QueryErrorKind::Semantic,
                error_name: Some("NOT_SUPPORTED".to_string()),
                query_id: None,
            }),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.engine.catalog = Some("memory".to_string());
    config.engine.schema = Some("bullshit".to_string());
    config.session.shutdown_grace_seconds = 1;
    config.session.max_override_connections = 2;
    config
}

pub fn test_server() -> (McpServer, Arc<FakeEngine>) {
    let engine = Arc::new(FakeEngine::new());
    let server = McpServer::new(test_config(), engine.clone());
    (server, engine)
}

// =============================================================================
// REQUEST HELPERS
// =============================================================================

pub fn initialize_request(id: i64) -> JsonRpcRequest {
    JsonRpcRequest::new(
        id,
        "initialize",
        Some(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "integration-test", "version": "1.0" }
        })),
    )
}

pub fn call_request(id: i64, tool: &str, arguments: Value) -> JsonRpcRequest {
    JsonRpcRequest::new(
        id,
        "tools/call",
        Some(json!({ "name": tool, "arguments": arguments })),
    )
}

pub fn read_request(id: i64, uri: &str) -> JsonRpcRequest {
    JsonRpcRequest::new(id, "resources/read", Some(json!({ "uri": uri })))
}

/// Parsed JSON body of a `resources/read` result.
pub fn resource_body(response: &JsonRpcResponse) -> Value {
    assert!(!response.is_error(), "expected a result, got {:?}", response.error);
    let result = response.result.as_ref().expect("resources/read result");
    let text = result["contents"][0]["text"].as_str().expect("resource text");
    serde_json::from_str(text).expect("resource text is JSON")
}

pub fn line(request: &JsonRpcRequest) -> String {
    serde_json::to_string(request).unwrap()
}

/// Initialize `session` and assert the handshake succeeded.
pub async fn ready_session(session: &Session) {
    let response = session.handle(initialize_request(0)).await.unwrap();
    assert!(!response.is_error(), "initialize failed: {:?}", response.error);
}

// =============================================================================
// ASSERTIONS
// =============================================================================

pub fn error_code(response: &JsonRpcResponse) -> i32 {
    response
        .error
        .as_ref()
        .unwrap_or_else(|| panic!("expected an error response, got {:?}", response.result))
        .code
}

/// Structured payload and error flag of a `tools/call` result.
pub fn tool_result(response: &JsonRpcResponse) -> (Value, bool) {
    assert!(!response.is_error(), "expected a result, got {:?}", response.error);
    let result = response.result.as_ref().expect("tool call result");
    let is_error = result["isError"].as_bool().expect("isError flag");
    (result["structuredContent"].clone(), is_error)
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
