//! Catalog metadata queries.
//!
//! Thin SQL over an [`EngineConnection`]. Names are always double-quoted
//! (with embedded quotes doubled), so callers can pass identifiers through
//! once they have validated them.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::EngineConnection;
use crate::error::EngineError;
use crate::result::QueryResult;

/// One column as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub extra: String,
    pub comment: String,
}

/// Double-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn show_catalogs_sql() -> String {
    "SHOW CATALOGS".to_string()
}

pub fn show_schemas_sql(catalog: &str) -> String {
    format!("SHOW SCHEMAS FROM {}", quote_ident(catalog))
}

pub fn show_tables_sql(catalog: &str, schema: &str) -> String {
    format!("SHOW TABLES FROM {}.{}", quote_ident(catalog), quote_ident(schema))
}

pub fn describe_sql(catalog: &str, schema: &str, table: &str) -> String {
    format!(
        "DESCRIBE {}.{}.{}",
        quote_ident(catalog),
        quote_ident(schema),
        quote_ident(table)
    )
}

pub fn kill_query_sql(query_id: &str) -> String {
    format!(
        "CALL system.runtime.kill_query(query_id => {}, message => 'Cancelled via MCP')",
        quote_literal(query_id)
    )
}

/// Names or columns from a metadata statement, with the row-cap flag of the
/// underlying result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub truncated: bool,
}

impl Listing<String> {
    fn names(result: &QueryResult) -> Self {
        Self {
            items: result.first_column_strings(),
            truncated: result.truncated,
        }
    }
}

impl<T> Listing<T> {
    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: PartialEq<Q>,
        Q: ?Sized,
    {
        self.items.iter().any(|i| i == item)
    }
}

pub async fn list_catalogs(
    conn: &dyn EngineConnection,
    cancel: &CancellationToken,
) -> Result<Listing<String>, EngineError> {
    Ok(Listing::names(&conn.execute(&show_catalogs_sql(), cancel).await?))
}

pub async fn list_schemas(
    conn: &dyn EngineConnection,
    catalog: &str,
    cancel: &CancellationToken,
) -> Result<Listing<String>, EngineError> {
    Ok(Listing::names(&conn.execute(&show_schemas_sql(catalog), cancel).await?))
}

pub async fn list_tables(
    conn: &dyn EngineConnection,
    catalog: &str,
    schema: &str,
    cancel: &CancellationToken,
) -> Result<Listing<String>, EngineError> {
    Ok(Listing::names(
        &conn.execute(&show_tables_sql(catalog, schema), cancel).await?,
    ))
}

pub async fn describe_table(
    conn: &dyn EngineConnection,
    catalog: &str,
    schema: &str,
    table: &str,
    cancel: &CancellationToken,
) -> Result<Listing<TableColumn>, EngineError> {
    let result = conn.execute(&describe_sql(catalog, schema, table), cancel).await?;
    Ok(Listing {
        items: table_columns(&result),
        truncated: result.truncated,
    })
}

/// Kill a running query by id.
pub async fn kill_query(
    conn: &dyn EngineConnection,
    query_id: &str,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    conn.execute(&kill_query_sql(query_id), cancel).await?;
    Ok(())
}

fn table_columns(result: &QueryResult) -> Vec<TableColumn> {
    let index = |name: &str, fallback: usize| result.column_index(name).unwrap_or(fallback);
    let (name, ty, extra, comment) = (
        index("Column", 0),
        index("Type", 1),
        index("Extra", 2),
        index("Comment", 3),
    );

    result
        .rows
        .iter()
        .map(|row| TableColumn {
            name: cell(row, name),
            declared_type: cell(row, ty),
            extra: cell(row, extra),
            comment: cell(row, comment),
        })
        .collect()
}

fn cell(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
