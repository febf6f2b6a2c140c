//! JSON shapes of the Trino client protocol.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, QueryErrorKind};

/// One page of a statement response (`POST /v1/statement` and every `nextUri`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    #[serde(default)]
    pub error: Option<QueryError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementStats {
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_name: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

impl QueryError {
    /// Map an engine-reported failure onto [`EngineError`].
    pub fn into_engine_error(self, query_id: &str) -> EngineError {
        let name = self.error_name.as_deref().unwrap_or_default();

        if name.starts_with("EXCEEDED_") && name.ends_with("TIME_LIMIT") {
            return EngineError::Timeout(self.message);
        }

        let kind = match (name, self.error_type.as_deref()) {
            ("SYNTAX_ERROR", _) => QueryErrorKind::Syntax,
            (_, Some("USER_ERROR")) => QueryErrorKind::Semantic,
            _ => QueryErrorKind::Engine,
        };

        let message = if self.message.is_empty() {
            format!("query failed with {}", self.error_name.as_deref().unwrap_or("unknown error"))
        } else {
            self.message
        };

        EngineError::Query {
            message,
            kind,
            error_name: self.error_name,
            query_id: Some(query_id.to_string()),
        }
    }
}

/// `GET /v1/info`.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerInfo {
    #[serde(rename = "nodeVersion", default)]
    pub node_version: Option<NodeVersion>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub starting: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeVersion {
    pub version: String,
}

impl From<ServerInfo> for crate::EngineInfo {
    fn from(info: ServerInfo) -> Self {
        Self {
            node_version: info.node_version.map(|v| v.version),
            environment: info.environment,
            starting: info.starting,
        }
    }
}
