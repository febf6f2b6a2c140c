//! Error types for the engine adapter.

use serde::Serialize;
use thiserror::Error;

/// How an engine-reported query failure is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// The statement did not parse.
    Syntax,
    /// The statement parsed but was rejected (unknown table, type mismatch...).
    Semantic,
    /// Any other failure reported by the engine while running the query.
    Engine,
}

/// Errors that can occur while talking to the query engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network failure, refused connection, rejected credentials, or a
    /// connection that has already been closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine rejected or failed the query. The message is the engine's own.
    #[error("{message}")]
    Query {
        message: String,
        kind: QueryErrorKind,
        error_name: Option<String>,
        query_id: Option<String>,
    },

    /// The query ran past the client or engine time limit.
    #[error("query timed out: {0}")]
    Timeout(String),

    /// The query was cancelled before it completed.
    #[error("query cancelled")]
    Cancelled,

    /// The coordinator answered with something that is not the statement protocol.
    #[error("unexpected response from engine: {0}")]
    Protocol(String),
}

impl EngineError {
    /// Stable name of the error category, used in structured error payloads.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Connection(_) => "connection_error",
            EngineError::Query { .. } => "query_error",
            EngineError::Timeout(_) => "timeout_error",
            EngineError::Cancelled => "cancelled",
            EngineError::Protocol(_) => "protocol_error",
        }
    }

    /// Whether the caller may reasonably retry the same request.
    ///
    /// Engine-reported query errors are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Connection(_) | EngineError::Timeout(_))
    }

    /// Whether the connection that produced this error should be discarded.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, EngineError::Connection(_) | EngineError::Protocol(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout(err.to_string())
        } else if err.is_decode() {
            EngineError::Protocol(err.to_string())
        } else {
            EngineError::Connection(err.to_string())
        }
    }
}
