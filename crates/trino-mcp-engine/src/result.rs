//! Query requests and transport-safe query results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConnectionTarget;

/// A SQL statement plus optional catalog/schema overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Why a [`QueryRequest`] was rejected before reaching the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("query text is empty")]
    EmptySql,
    #[error("{field} '{value}' is not a valid identifier")]
    InvalidIdentifier { field: &'static str, value: String },
    #[error("a schema override requires a catalog")]
    SchemaWithoutCatalog,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            catalog: None,
            schema: None,
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Check the request before it is sent anywhere.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.sql.trim().is_empty() {
            return Err(RequestError::EmptySql);
        }
        for (field, value) in [("catalog", &self.catalog), ("schema", &self.schema)] {
            if let Some(value) = value
                && !trino_mcp_core::is_valid_identifier(value)
            {
                return Err(RequestError::InvalidIdentifier {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the connection target, falling back to `defaults` for any
    /// part the request does not override.
    pub fn resolve_target(&self, defaults: &ConnectionTarget) -> Result<ConnectionTarget, RequestError> {
        defaults.with_overrides(self.catalog.as_deref(), self.schema.as_deref())
    }
}

/// Column definition returned by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as declared in the result set.
    pub name: String,
    /// Declared engine type, e.g. `varchar`, `decimal(10,2)`, `array(bigint)`.
    #[serde(rename = "type")]
    pub declared_type: String,
}

/// Structured, JSON-safe result of a query.
///
/// Every value in `rows` is already coerced to a JSON primitive or a nested
/// array/object of primitives. Row order follows the engine's order and each
/// row has one entry per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Engine-assigned query id, when the engine reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
    /// Number of rows in `rows`.
    pub row_count: usize,
    /// Set when the row cap cut the result short.
    pub truncated: bool,
    /// Wall-clock time spent executing, in milliseconds.
    pub query_time_ms: u64,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of the first column, as strings. Used by metadata listings.
    pub fn first_column_strings(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}
