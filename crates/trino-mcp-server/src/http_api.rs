//! Direct HTTP query facade.
//!
//! Plain JSON endpoints for callers that do not speak MCP. Queries go
//! through the shared [`ConnectionPool`] rather than a protocol session, and
//! every failure is turned into the `{success: false, message}` envelope.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use trino_mcp_engine::{ConnectionPool, ConnectionTarget, EngineError, QueryRequest, QueryResult};

/// Rows rendered into `formatted_results` before the table is cut off.
const FORMATTED_ROW_LIMIT: usize = 50;

/// Shared state of the facade router.
#[derive(Clone)]
pub struct HttpApiState {
    pool: ConnectionPool,
    defaults: ConnectionTarget,
    shutdown: CancellationToken,
}

impl HttpApiState {
    pub fn new(pool: ConnectionPool, shutdown: CancellationToken) -> Self {
        let defaults = pool.engine().default_target();
        Self {
            pool,
            defaults,
            shutdown,
        }
    }
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Run `EXPLAIN <query>` instead of the query itself.
    #[serde(default)]
    pub explain: bool,
}

/// Response envelope of `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub results: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_results: Option<String>,
}

impl QueryResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            results: None,
            formatted_results: None,
        }
    }
}

/// Create the facade router.
pub fn create_router(state: HttpApiState) -> Router {
    Router::new()
        .route("/", get(handle_usage))
        .route("/api", get(handle_usage))
        .route("/query", post(handle_query))
        .route("/api/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Query { .. } => StatusCode::BAD_REQUEST,
        EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Connection(_) | EngineError::Protocol(_) | EngineError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn reply(status: StatusCode, body: QueryResponse) -> Response {
    (status, Json(body)).into_response()
}

/// Handle `POST /query` and `POST /api/query`.
async fn handle_query(
    State(state): State<Arc<HttpApiState>>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return reply(
                StatusCode::BAD_REQUEST,
                QueryResponse::failure(format!("Invalid request: {}", rejection.body_text())),
            );
        }
    };

    if body.query.trim().is_empty() {
        return reply(StatusCode::BAD_REQUEST, QueryResponse::failure("Invalid request: query text is empty"));
    }
    let sql = if body.explain {
        format!("EXPLAIN {}", body.query)
    } else {
        body.query.clone()
    };
    let request = QueryRequest {
        sql,
        catalog: body.catalog,
        schema: body.schema,
    };
    let target = match request
        .validate()
        .and_then(|()| request.resolve_target(&state.defaults))
    {
        Ok(target) => target,
        Err(e) => return reply(StatusCode::BAD_REQUEST, QueryResponse::failure(format!("Invalid request: {e}"))),
    };

    info!(catalog = ?target.catalog, schema = ?target.schema, explain = body.explain, "HTTP query");
    let started = Instant::now();
    let cancel = state.shutdown.child_token();

    let outcome = match state.pool.checkout(&target).await {
        Ok(conn) => conn.execute(&request.sql, &cancel).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            info!(
                query_id = ?result.query_id,
                row_count = result.row_count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "HTTP query completed"
            );
            let formatted = format_results(&result);
            reply(
                StatusCode::OK,
                QueryResponse {
                    success: true,
                    message: "Query executed successfully".to_string(),
                    results: Some(result),
                    formatted_results: Some(formatted),
                },
            )
        }
        Err(e) => {
            warn!(category = e.category(), error = %e, "HTTP query failed");
            reply(
                status_for(&e),
                QueryResponse::failure(format!("Error executing query: {e}")),
            )
        }
    }
}

/// Handle `GET /` and `GET /api`.
async fn handle_usage() -> impl IntoResponse {
    Json(json!({
        "message": "Trino MCP API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health - Check server and engine health",
            "query": "POST /query or POST /api/query - Execute a SQL query",
        },
        "usage": "POST a JSON body with 'query' and optionally 'catalog', 'schema' and 'explain'",
        "example": {
            "query": "SELECT * FROM memory.bullshit.real_bullshit_data LIMIT 3",
            "catalog": "memory",
            "schema": "bullshit",
        },
    }))
}

/// Handle `GET /health`. Always 200; engine reachability is reported inside.
async fn handle_health(State(state): State<Arc<HttpApiState>>) -> impl IntoResponse {
    let engine = match state.pool.engine().ping().await {
        Ok(info) => json!({
            "status": "up",
            "node_version": info.node_version,
            "environment": info.environment,
            "starting": info.starting,
        }),
        Err(e) => json!({
            "status": "down",
            "error": e.to_string(),
        }),
    };

    Json(json!({
        "status": "ok",
        "service": "trino-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "engine": engine,
    }))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a result as a plain-text table.
pub fn format_results(result: &QueryResult) -> String {
    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let shown = &result.rows[..result.rows.len().min(FORMATTED_ROW_LIMIT)];
    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(value.chars().count());
            }
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&headers));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        let _ = writeln!(out, "{}", line(row));
    }

    let hidden = result.rows.len() - shown.len();
    if hidden > 0 {
        let _ = writeln!(out, "... {hidden} more rows");
    }
    let _ = write!(
        out,
        "({} rows{})",
        result.row_count,
        if result.truncated { ", truncated" } else { "" }
    );
    out
}
