//! Catalog browsing resources.
//!
//! The same metadata the list/inspect tools return, addressed by URI so
//! clients can browse it without a tool call:
//!
//! | URI | Contents |
//! |-----|----------|
//! | `trino://catalog` | catalog names |
//! | `trino://catalog/{catalog}` | catalog summary |
//! | `trino://catalog/{catalog}/schemas` | schema names |
//! | `trino://catalog/{catalog}/schema/{schema}` | schema summary |
//! | `trino://catalog/{catalog}/schema/{schema}/tables` | table names |
//! | `trino://catalog/{catalog}/schema/{schema}/table/{table}` | table with columns |
//! | `trino://catalog/{catalog}/schema/{schema}/table/{table}/columns` | columns |
//! | `trino://catalog/{catalog}/schema/{schema}/table/{table}/column/{column}` | one column |

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use trino_mcp_core::is_valid_identifier;
use trino_mcp_engine::metadata;

use crate::context::SessionContext;
use crate::dispatcher::{connection, settle};
use crate::error::{DispatchError, ProtocolError};
use crate::protocol::{ResourceContents, ResourceDefinition, ResourceTemplate};

pub const CATALOGS_URI: &str = "trino://catalog";
const SCHEME: &str = "trino://";
const JSON_MIME: &str = "application/json";

/// A parsed `trino://` resource address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Catalogs,
    Catalog {
        catalog: String,
    },
    Schemas {
        catalog: String,
    },
    Schema {
        catalog: String,
        schema: String,
    },
    Tables {
        catalog: String,
        schema: String,
    },
    Table {
        catalog: String,
        schema: String,
        table: String,
    },
    Columns {
        catalog: String,
        schema: String,
        table: String,
    },
    Column {
        catalog: String,
        schema: String,
        table: String,
        column: String,
    },
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self, ProtocolError> {
        let unknown = || ProtocolError::InvalidParams(format!("Unknown resource: {uri}"));
        let path = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
        let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();

        let name = |value: &str, kind: &str| {
            if is_valid_identifier(value) {
                Ok(value.to_string())
            } else {
                Err(ProtocolError::InvalidParams(format!(
                    "'{value}' is not a valid {kind} name"
                )))
            }
        };

        let parsed = match segments.as_slice() {
            ["catalog"] => ResourceUri::Catalogs,
            ["catalog", c] => ResourceUri::Catalog {
                catalog: name(c, "catalog")?,
            },
            ["catalog", c, "schemas"] => ResourceUri::Schemas {
                catalog: name(c, "catalog")?,
            },
            ["catalog", c, "schema", s] => ResourceUri::Schema {
                catalog: name(c, "catalog")?,
                schema: name(s, "schema")?,
            },
            ["catalog", c, "schema", s, "tables"] => ResourceUri::Tables {
                catalog: name(c, "catalog")?,
                schema: name(s, "schema")?,
            },
            ["catalog", c, "schema", s, "table", t] => ResourceUri::Table {
                catalog: name(c, "catalog")?,
                schema: name(s, "schema")?,
                table: name(t, "table")?,
            },
            ["catalog", c, "schema", s, "table", t, "columns"] => ResourceUri::Columns {
                catalog: name(c, "catalog")?,
                schema: name(s, "schema")?,
                table: name(t, "table")?,
            },
            ["catalog", c, "schema", s, "table", t, "column", col] => ResourceUri::Column {
                catalog: name(c, "catalog")?,
                schema: name(s, "schema")?,
                table: name(t, "table")?,
                column: name(col, "column")?,
            },
            _ => return Err(unknown()),
        };
        Ok(parsed)
    }
}

fn schemas_uri(catalog: &str) -> String {
    format!("{CATALOGS_URI}/{catalog}/schemas")
}

fn tables_uri(catalog: &str, schema: &str) -> String {
    format!("{CATALOGS_URI}/{catalog}/schema/{schema}/tables")
}

/// Fixed resources, listed by `resources/list`.
pub fn list() -> Vec<ResourceDefinition> {
    vec![ResourceDefinition {
        uri: CATALOGS_URI.to_string(),
        name: "catalogs".to_string(),
        description: Some("All catalogs visible to the configured Trino user".to_string()),
        mime_type: JSON_MIME.to_string(),
    }]
}

/// Parameterised resources, listed by `resources/templates/list`.
pub fn templates() -> Vec<ResourceTemplate> {
    let template = |uri_template: &str, name: &str, description: &str| ResourceTemplate {
        uri_template: uri_template.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: JSON_MIME.to_string(),
    };
    vec![
        template("trino://catalog/{catalog}", "catalog", "A catalog"),
        template("trino://catalog/{catalog}/schemas", "schemas", "Schemas in a catalog"),
        template("trino://catalog/{catalog}/schema/{schema}", "schema", "A schema"),
        template(
            "trino://catalog/{catalog}/schema/{schema}/tables",
            "tables",
            "Tables in a schema",
        ),
        template(
            "trino://catalog/{catalog}/schema/{schema}/table/{table}",
            "table",
            "A table and its columns",
        ),
        template(
            "trino://catalog/{catalog}/schema/{schema}/table/{table}/columns",
            "columns",
            "Columns of a table",
        ),
        template(
            "trino://catalog/{catalog}/schema/{schema}/table/{table}/column/{column}",
            "column",
            "One column of a table",
        ),
    ]
}

/// Read one resource on the session's default connection.
pub async fn read(
    ctx: &mut SessionContext,
    uri: &str,
    cancel: &CancellationToken,
) -> Result<ResourceContents, ProtocolError> {
    let resource = ResourceUri::parse(uri)?;
    debug!(session_id = %ctx.session_id(), uri = %uri, "Reading resource");

    let payload = fetch(ctx, resource, cancel)
        .await
        .map_err(DispatchError::into_protocol_error)?;
    let text = serde_json::to_string(&payload).map_err(|e| ProtocolError::Internal(e.to_string()))?;

    Ok(ResourceContents {
        uri: uri.to_string(),
        mime_type: JSON_MIME.to_string(),
        text,
    })
}

async fn fetch(
    ctx: &mut SessionContext,
    resource: ResourceUri,
    cancel: &CancellationToken,
) -> Result<Value, DispatchError> {
    let target = ctx.default_target().clone();

    match resource {
        // Summaries need no engine round trip.
        ResourceUri::Catalog { catalog } => Ok(json!({
            "schemas": schemas_uri(&catalog),
            "name": catalog,
        })),
        ResourceUri::Schema { catalog, schema } => Ok(json!({
            "tables": tables_uri(&catalog, &schema),
            "name": schema,
            "catalog": catalog,
        })),
        ResourceUri::Catalogs => {
            let conn = connection(ctx, &target, cancel).await?;
            let catalogs = metadata::list_catalogs(conn.as_ref(), cancel).await;
            let catalogs = settle(ctx, &target, catalogs).await?;
            Ok(json!({ "catalogs": catalogs.items, "truncated": catalogs.truncated }))
        }
        ResourceUri::Schemas { catalog } => {
            let conn = connection(ctx, &target, cancel).await?;
            let schemas = metadata::list_schemas(conn.as_ref(), &catalog, cancel).await;
            let schemas = settle(ctx, &target, schemas).await?;
            Ok(json!({
                "catalog": catalog,
                "schemas": schemas.items,
                "truncated": schemas.truncated,
            }))
        }
        ResourceUri::Tables { catalog, schema } => {
            let conn = connection(ctx, &target, cancel).await?;
            let tables = metadata::list_tables(conn.as_ref(), &catalog, &schema, cancel).await;
            let tables = settle(ctx, &target, tables).await?;
            Ok(json!({
                "catalog": catalog,
                "schema": schema,
                "tables": tables.items,
                "truncated": tables.truncated,
            }))
        }
        ResourceUri::Table { catalog, schema, table } => {
            let conn = connection(ctx, &target, cancel).await?;
            let columns = metadata::describe_table(conn.as_ref(), &catalog, &schema, &table, cancel).await;
            let columns = settle(ctx, &target, columns).await?;
            Ok(json!({
                "name": table,
                "catalog": catalog,
                "schema": schema,
                "columns": columns.items,
                "truncated": columns.truncated,
            }))
        }
        ResourceUri::Columns { catalog, schema, table } => {
            let conn = connection(ctx, &target, cancel).await?;
            let columns = metadata::describe_table(conn.as_ref(), &catalog, &schema, &table, cancel).await;
            let columns = settle(ctx, &target, columns).await?;
            Ok(json!({
                "catalog": catalog,
                "schema": schema,
                "table": table,
                "columns": columns.items,
                "truncated": columns.truncated,
            }))
        }
        ResourceUri::Column {
            catalog,
            schema,
            table,
            column,
        } => {
            let conn = connection(ctx, &target, cancel).await?;
            let columns = metadata::describe_table(conn.as_ref(), &catalog, &schema, &table, cancel).await;
            let columns = settle(ctx, &target, columns).await?;
            let found = columns
                .items
                .into_iter()
                .find(|c| c.name == column)
                .ok_or_else(|| {
                    DispatchError::invalid(
                        "resources/read",
                        format!("Column {column} not found in {catalog}.{schema}.{table}"),
                    )
                })?;
            Ok(json!({
                "catalog": catalog,
                "schema": schema,
                "table": table,
                "column": found,
            }))
        }
    }
}
