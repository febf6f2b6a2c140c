//! Error types for the MCP crate.

use serde_json::json;
use thiserror::Error;
use trino_mcp_engine::EngineError;

use crate::protocol::{JsonRpcResponse, error_codes};

/// Errors that can stop a server or transport.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Engine setup error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// A malformed or out-of-order protocol message, reported to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Server not initialized")]
    NotInitialized,

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::Parse(_) => error_codes::PARSE_ERROR,
            ProtocolError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            ProtocolError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            ProtocolError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            ProtocolError::NotInitialized => error_codes::SERVER_NOT_INITIALIZED,
            ProtocolError::ShuttingDown => error_codes::SHUTTING_DOWN,
            ProtocolError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn into_response(self, id: Option<serde_json::Value>) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.code(), self.to_string())
    }
}

/// Why a tool call could not be completed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No tool with that name is registered.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments failed validation before reaching the engine.
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArgument { tool: String, reason: String },

    /// The engine failed while running the tool.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The tool ran but its result could not be built.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        DispatchError::InvalidArgument {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// The protocol error reported when a call fails before it produces a
    /// tool result.
    pub fn into_protocol_error(self) -> ProtocolError {
        match self {
            DispatchError::NotFound(_) | DispatchError::InvalidArgument { .. } => {
                ProtocolError::InvalidParams(self.to_string())
            }
            DispatchError::Engine(e) => ProtocolError::Internal(e.to_string()),
            DispatchError::Internal(message) => ProtocolError::Internal(message),
        }
    }
}

/// Structured payload describing an engine failure inside a tool result.
pub fn engine_error_payload(err: &EngineError) -> serde_json::Value {
    let mut payload = json!({
        "error": err.to_string(),
        "category": err.category(),
        "retryable": err.is_retryable(),
    });
    if let EngineError::Query {
        kind,
        error_name,
        query_id,
        ..
    } = err
    {
        payload["kind"] = json!(kind);
        payload["error_name"] = json!(error_name);
        payload["query_id"] = json!(query_id);
    }
    payload
}
