//! Tool dispatch.
//!
//! Validates tool arguments against the tool's parameter list, then runs the
//! matching handler with the caller's [`SessionContext`]. Handlers return a
//! JSON payload or a [`DispatchError`]; they never see transport state.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trino_mcp_core::is_valid_identifier;
use trino_mcp_engine::{
    ConnectionTarget, EngineConnection, EngineError, QueryRequest, RequestError, metadata,
};

use crate::context::SessionContext;
use crate::error::DispatchError;
use crate::tools::{BuiltinTool, Tool, ToolRegistry};

static QUERY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("query id pattern is valid"));

/// Payload produced by a successful tool call.
pub type ToolOutput = Value;

/// Validated tool arguments. Every parameter is a string.
#[derive(Debug, Default)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }
}

/// Routes tool calls to their handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the named tool.
    pub async fn dispatch(
        &self,
        ctx: &mut SessionContext,
        tool_name: &str,
        arguments: Option<Map<String, Value>>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, DispatchError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| DispatchError::NotFound(tool_name.to_string()))?;
        let args = validate_arguments(tool, arguments.unwrap_or_default())?;

        debug!(session_id = %ctx.session_id(), tool = tool.name, "Dispatching tool call");

        match tool.kind {
            BuiltinTool::ExecuteQuery => execute_query(ctx, &args, cancel).await,
            BuiltinTool::ListCatalogs => list_catalogs(ctx, cancel).await,
            BuiltinTool::ListSchemas => list_schemas(ctx, &args, cancel).await,
            BuiltinTool::ListTables => list_tables(ctx, &args, cancel).await,
            BuiltinTool::InspectTable => inspect_table(ctx, &args, cancel).await,
            BuiltinTool::CancelQuery => cancel_query(ctx, &args, cancel).await,
        }
    }
}

/// Validate tool arguments against the tool's parameters.
fn validate_arguments(tool: &Tool, arguments: Map<String, Value>) -> Result<Arguments, DispatchError> {
    for field in arguments.keys() {
        if tool.param(field).is_none() {
            return Err(DispatchError::invalid(tool.name, format!("Unknown field: {field}")));
        }
    }

    let mut values = Map::new();
    for param in &tool.params {
        match arguments.get(param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(DispatchError::invalid(
                    tool.name,
                    format!("Missing required field: {}", param.name),
                ));
            }
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                check_value(tool, param.name, s)?;
                values.insert(param.name.to_string(), Value::String(s.clone()));
            }
            Some(other) => {
                return Err(DispatchError::invalid(
                    tool.name,
                    format!("Invalid type for '{}': expected string, got {other}", param.name),
                ));
            }
        }
    }

    Ok(Arguments { values })
}

fn check_value(tool: &Tool, field: &str, value: &str) -> Result<(), DispatchError> {
    match field {
        "sql" if value.trim().is_empty() => {
            Err(DispatchError::invalid(tool.name, "Query text is empty"))
        }
        "catalog" | "schema" | "table" if !is_valid_identifier(value) => Err(DispatchError::invalid(
            tool.name,
            format!("'{value}' is not a valid {field} name"),
        )),
        "query_id" if !QUERY_ID.is_match(value) => Err(DispatchError::invalid(
            tool.name,
            format!("'{value}' is not a valid query id"),
        )),
        _ => Ok(()),
    }
}

fn request_error(tool: &str, err: RequestError) -> DispatchError {
    DispatchError::invalid(tool, err.to_string())
}

/// Resolve catalog/schema overrides against the session defaults.
fn resolve(ctx: &SessionContext, tool: &str, args: &Arguments) -> Result<ConnectionTarget, DispatchError> {
    ctx.default_target()
        .with_overrides(args.get("catalog"), args.get("schema"))
        .map_err(|e| request_error(tool, e))
}

fn debug_info(ctx: &SessionContext, sql: &str, target: &ConnectionTarget) -> Option<Value> {
    ctx.debug().then(|| {
        json!({
            "sql": sql,
            "catalog": target.catalog,
            "schema": target.schema,
        })
    })
}

fn with_debug(mut payload: Value, debug: Option<Value>) -> Value {
    if let (Some(debug), Some(object)) = (debug, payload.as_object_mut()) {
        object.insert("debug".to_string(), debug);
    }
    payload
}

/// The session connection for `target`.
pub(crate) async fn connection(
    ctx: &mut SessionContext,
    target: &ConnectionTarget,
    cancel: &CancellationToken,
) -> Result<Arc<dyn EngineConnection>, DispatchError> {
    let conn = ctx.connection_for(target).await.map_err(|e| {
        warn!(session_id = %ctx.session_id(), error = %e, "Engine connection unavailable");
        DispatchError::from(e)
    })?;
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled.into());
    }
    Ok(conn)
}

/// Pass an engine result through, dropping the connection for `target` when
/// the failure means it is no longer usable.
pub(crate) async fn settle<T>(
    ctx: &mut SessionContext,
    target: &ConnectionTarget,
    result: Result<T, EngineError>,
) -> Result<T, DispatchError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if e.poisons_connection() {
                ctx.discard(target).await;
            }
            Err(e.into())
        }
    }
}

async fn execute_query(
    ctx: &mut SessionContext,
    args: &Arguments,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DispatchError> {
    let tool = "execute_query";
    let mut request = QueryRequest::new(args.get("sql").unwrap_or_default());
    request.catalog = args.get("catalog").map(str::to_string);
    request.schema = args.get("schema").map(str::to_string);
    request.validate().map_err(|e| request_error(tool, e))?;
    let target = request.resolve_target(ctx.default_target()).map_err(|e| request_error(tool, e))?;

    info!(
        session_id = %ctx.session_id(),
        catalog = ?target.catalog,
        schema = ?target.schema,
        "Executing query"
    );

    let conn = connection(ctx, &target, cancel).await?;
    let result = conn.execute(&request.sql, cancel).await;
    let result = settle(ctx, &target, result).await?;

    debug!(
        session_id = %ctx.session_id(),
        query_id = ?result.query_id,
        row_count = result.row_count,
        truncated = result.truncated,
        max_rows = ctx.max_rows(),
        "Query completed"
    );
    let payload = serde_json::to_value(&result)
        .map_err(|e| DispatchError::Internal(format!("Failed to serialize query result: {e}")))?;
    Ok(with_debug(payload, debug_info(ctx, &request.sql, &target)))
}

async fn list_catalogs(ctx: &mut SessionContext, cancel: &CancellationToken) -> Result<ToolOutput, DispatchError> {
    let target = ctx.default_target().clone();
    let conn = connection(ctx, &target, cancel).await?;
    let catalogs = metadata::list_catalogs(conn.as_ref(), cancel).await;
    let catalogs = settle(ctx, &target, catalogs).await?;

    let payload = json!({ "catalogs": catalogs.items, "truncated": catalogs.truncated });
    Ok(with_debug(payload, debug_info(ctx, &metadata::show_catalogs_sql(), &target)))
}

async fn list_schemas(
    ctx: &mut SessionContext,
    args: &Arguments,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DispatchError> {
    let catalog = args
        .get("catalog")
        .map(str::to_string)
        .or_else(|| ctx.default_target().catalog.clone())
        .ok_or_else(|| DispatchError::invalid("list_schemas", "catalog is required when no default catalog is configured"))?;

    let target = ctx.default_target().clone();
    let conn = connection(ctx, &target, cancel).await?;
    let schemas = metadata::list_schemas(conn.as_ref(), &catalog, cancel).await;
    let schemas = settle(ctx, &target, schemas).await?;

    let payload = json!({
        "catalog": catalog,
        "schemas": schemas.items,
        "truncated": schemas.truncated,
    });
    Ok(with_debug(payload, debug_info(ctx, &metadata::show_schemas_sql(&catalog), &target)))
}

/// Catalog and schema for a table-level tool; both must end up set.
fn table_scope(ctx: &SessionContext, tool: &str, args: &Arguments) -> Result<(String, String), DispatchError> {
    let scope = resolve(ctx, tool, args)?;
    match (scope.catalog, scope.schema) {
        (Some(catalog), Some(schema)) => Ok((catalog, schema)),
        (None, _) => Err(DispatchError::invalid(
            tool,
            "catalog is required when no default catalog is configured",
        )),
        (Some(_), None) => Err(DispatchError::invalid(
            tool,
            "schema is required when no default schema applies",
        )),
    }
}

async fn list_tables(
    ctx: &mut SessionContext,
    args: &Arguments,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DispatchError> {
    let (catalog, schema) = table_scope(ctx, "list_tables", args)?;

    let target = ctx.default_target().clone();
    let conn = connection(ctx, &target, cancel).await?;
    let tables = metadata::list_tables(conn.as_ref(), &catalog, &schema, cancel).await;
    let tables = settle(ctx, &target, tables).await?;

    let payload = json!({
        "catalog": catalog,
        "schema": schema,
        "tables": tables.items,
        "truncated": tables.truncated,
    });
    Ok(with_debug(
        payload,
        debug_info(ctx, &metadata::show_tables_sql(&catalog, &schema), &target),
    ))
}

async fn inspect_table(
    ctx: &mut SessionContext,
    args: &Arguments,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DispatchError> {
    let (catalog, schema) = table_scope(ctx, "inspect_table", args)?;
    let table = args.get("table").unwrap_or_default().to_string();

    let target = ctx.default_target().clone();
    let conn = connection(ctx, &target, cancel).await?;
    let columns = metadata::describe_table(conn.as_ref(), &catalog, &schema, &table, cancel).await;
    let columns = settle(ctx, &target, columns).await?;

    let payload = json!({
        "catalog": catalog,
        "schema": schema,
        "table": table,
        "columns": columns.items,
        "truncated": columns.truncated,
    });
    Ok(with_debug(
        payload,
        debug_info(ctx, &metadata::describe_sql(&catalog, &schema, &table), &target),
    ))
}

async fn cancel_query(
    ctx: &mut SessionContext,
    args: &Arguments,
    cancel: &CancellationToken,
) -> Result<ToolOutput, DispatchError> {
    let query_id = args.get("query_id").unwrap_or_default().to_string();
    info!(session_id = %ctx.session_id(), query_id = %query_id, "Cancelling query");

    let target = ctx.default_target().clone();
    let conn = connection(ctx, &target, cancel).await?;
    let killed = metadata::kill_query(conn.as_ref(), &query_id, cancel).await;
    settle(ctx, &target, killed).await?;

    let payload = json!({
        "query_id": query_id,
        "cancelled": true,
        "message": format!("Query {query_id} cancelled successfully"),
    });
    Ok(with_debug(payload, debug_info(ctx, &metadata::kill_query_sql(&query_id), &target)))
}
