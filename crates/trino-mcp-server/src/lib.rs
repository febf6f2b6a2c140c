//! # trino-mcp-server
//!
//! MCP (Model Context Protocol) server exposing a Trino coordinator as tools
//! for AI clients.
//!
//! ## Architecture
//!
//! ```text
//! AI client (Claude Desktop, agents, ...)
//!       │
//!       │ JSON-RPC over stdio, or SSE + POST
//!       ▼
//! ┌──────────────────────┐
//! │  Transport           │  stdio / sse
//! │  Session             │  state machine, teardown
//! │  Dispatcher          │  argument checks, handlers
//! │  SessionContext      │  per-session connections
//! └─────────┬────────────┘
//!           │  statement protocol
//!           ▼
//!     Trino coordinator          ◄── direct HTTP facade (pooled)
//! ```
//!
//! ## Tools
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `execute_query` | `sql`, `catalog?`, `schema?` | columns, rows, row count, truncation flag |
//! | `list_catalogs` | | catalog names |
//! | `list_schemas` | `catalog?` | schema names |
//! | `list_tables` | `catalog?`, `schema?` | table names |
//! | `inspect_table` | `table`, `catalog?`, `schema?` | column names, types, comments |
//! | `cancel_query` | `query_id` | confirmation |
//!
//! Listing tools report `truncated` when the row cap cut the listing short.
//! Engine failures come back as tool results with `isError: true`; protocol
//! misuse comes back as JSON-RPC errors.
//!
//! ## Resources
//!
//! The same catalog metadata is browsable under `trino://catalog/...` URIs via
//! `resources/list`, `resources/templates/list` and `resources/read`; see
//! [`resources`].
//!
//! ## Example Usage
//!
//! ```ignore
//! use trino_mcp_core::ServerConfig;
//! use trino_mcp_server::McpServer;
//!
//! let config = ServerConfig::from_file("trino-mcp.yaml")?;
//! let server = McpServer::from_config(config)?;
//! server.run().await?;
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod http_api;
pub mod machine;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod session;
pub mod sse;
pub mod stdio;
pub mod tools;

pub use context::SessionContext;
pub use dispatcher::{Dispatcher, ToolOutput};
pub use error::{DispatchError, McpError, ProtocolError};
pub use http_api::{HttpApiState, QueryBody, QueryResponse};
pub use machine::{Action, SessionState};
pub use protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ListResourceTemplatesResponse,
    ListResourcesResponse, ListToolsResponse, ReadResourceParams, ReadResourceResponse, ResourceContents,
    ResourceDefinition, ResourceTemplate, ServerInfo, ToolAnnotations, ToolContent, ToolDefinition,
};
pub use resources::ResourceUri;
pub use server::McpServer;
pub use session::{Session, SessionOptions};
pub use sse::SseState;
pub use stdio::StdioExit;
pub use tools::{BuiltinTool, Tool, ToolRegistry};
