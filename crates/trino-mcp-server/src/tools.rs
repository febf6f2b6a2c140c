//! Tool registry for MCP tools.
//!
//! Tools are registered once at startup by [`ToolRegistry::builtin`]; the
//! registry is then shared behind an `Arc` and never mutated. Each entry maps
//! a tool name to a [`BuiltinTool`] variant, which the dispatcher matches on.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::protocol::{ToolAnnotations, ToolDefinition};

/// Handler selector for a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    ExecuteQuery,
    ListCatalogs,
    ListSchemas,
    ListTables,
    InspectTable,
    CancelQuery,
}

/// One string parameter of a tool.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl ParamSpec {
    const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: true,
        }
    }

    const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: false,
        }
    }
}

/// A registered tool.
#[derive(Debug, Clone)]
pub struct Tool {
    pub kind: BuiltinTool,
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub read_only: bool,
}

impl Tool {
    /// JSON schema for the tool's arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": "string",
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            input_schema: self.input_schema(),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(self.read_only),
                open_world_hint: Some(false),
            }),
        }
    }
}

/// Registry of available MCP tools, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in tool.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(Tool {
            kind: BuiltinTool::ExecuteQuery,
            name: "execute_query",
            description: "Execute a SQL query against Trino. Catalog and schema default to the session's configured ones.",
            params: vec![
                ParamSpec::required("sql", "The SQL query to execute"),
                ParamSpec::optional("catalog", "Catalog to run the query in"),
                ParamSpec::optional("schema", "Schema to run the query in (requires a catalog)"),
            ],
            read_only: false,
        });
        registry.register(Tool {
            kind: BuiltinTool::ListCatalogs,
            name: "list_catalogs",
            description: "List the catalogs available in Trino.",
            params: vec![],
            read_only: true,
        });
        registry.register(Tool {
            kind: BuiltinTool::ListSchemas,
            name: "list_schemas",
            description: "List the schemas in a catalog.",
            params: vec![ParamSpec::optional("catalog", "Catalog name; defaults to the session catalog")],
            read_only: true,
        });
        registry.register(Tool {
            kind: BuiltinTool::ListTables,
            name: "list_tables",
            description: "List the tables in a schema.",
            params: vec![
                ParamSpec::optional("catalog", "Catalog name; defaults to the session catalog"),
                ParamSpec::optional("schema", "Schema name; defaults to the session schema"),
            ],
            read_only: true,
        });
        registry.register(Tool {
            kind: BuiltinTool::InspectTable,
            name: "inspect_table",
            description: "Describe the columns of a table: name, type, extra, and comment.",
            params: vec![
                ParamSpec::required("table", "Table name"),
                ParamSpec::optional("catalog", "Catalog name; defaults to the session catalog"),
                ParamSpec::optional("schema", "Schema name; defaults to the session schema"),
            ],
            read_only: true,
        });
        registry.register(Tool {
            kind: BuiltinTool::CancelQuery,
            name: "cancel_query",
            description: "Cancel a running query by its Trino query id.",
            params: vec![ParamSpec::required("query_id", "ID of the query to cancel")],
            read_only: false,
        });

        registry
    }

    fn register(&mut self, tool: Tool) {
        if let Some(&existing) = self.index.get(tool.name) {
            self.tools[existing] = tool;
            return;
        }
        self.index.insert(tool.name, self.tools.len());
        self.tools.push(tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool descriptors, in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(Tool::definition).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool names.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }
}
