//! Session and tool dispatch tests.
//!
//! These drive [`Session::handle`] directly, without a transport.

use super::common::*;
use serde_json::json;
use trino_mcp_server::{JsonRpcRequest, SessionState};

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_initialize_opens_one_connection() {
    let (server, engine) = test_server();
    let session = server.new_session();

    ready_session(&session).await;
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(engine.connects(), 1);
    assert_eq!(session.open_connections().await, 1);
}

#[tokio::test]
async fn test_unsupported_version_gets_latest() {
    let (server, _engine) = test_server();
    let session = server.new_session();

    let response = session
        .handle(JsonRpcRequest::new(
            1,
            "initialize",
            Some(json!({ "protocolVersion": "1999-01-01", "capabilities": {} })),
        ))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn test_repeated_initialize_is_idempotent() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let again = session.handle(initialize_request(5)).await.unwrap();
    assert_eq!(again.id, Some(json!(5)));
    assert_eq!(again.result.unwrap()["protocolVersion"], "2025-03-26");
    assert_eq!(engine.connects(), 1);
}

#[tokio::test]
async fn test_handshake_failure_closes_session() {
    let (server, _engine) = test_server();
    let session = server.new_session();

    let response = session
        .handle(JsonRpcRequest::new(1, "initialize", Some(json!({ "capabilities": {} }))))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.is_close_requested());

    let response = session.handle(JsonRpcRequest::new(2, "ping", None)).await.unwrap();
    assert_eq!(error_code(&response), -32000);
}

#[tokio::test]
async fn test_unreachable_engine_does_not_block_initialize() {
    let (server, engine) = test_server();
    engine.set_reachable(false);
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "execute_query", json!({ "sql": "SELECT 1 AS test" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(is_error);
    assert_eq!(payload["category"], "connection_error");
    assert_eq!(payload["retryable"], true);

    // The next call reconnects.
    engine.set_reachable(true);
    let response = session
        .handle(call_request(2, "execute_query", json!({ "sql": "SELECT 1 AS test" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["rows"], json!([[1]]));
}

#[tokio::test]
async fn test_unknown_method() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(JsonRpcRequest::new(1, "resources/list", None))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32601);
}

// =============================================================================
// TOOL LISTING
// =============================================================================

#[tokio::test]
async fn test_tools_list() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(JsonRpcRequest::new(1, "tools/list", None))
        .await
        .unwrap();
    let result = response.result.unwrap();
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "execute_query",
            "list_catalogs",
            "list_schemas",
            "list_tables",
            "inspect_table",
            "cancel_query"
        ]
    );
    assert_eq!(result["tools"][0]["inputSchema"]["required"], json!(["sql"]));
}

// =============================================================================
// EXECUTE QUERY
// =============================================================================

#[tokio::test]
async fn test_catalog_override_matching_defaults() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let plain = session
        .handle(call_request(1, "execute_query", json!({ "sql": TARGET_QUERY })))
        .await
        .unwrap();
    let explicit = session
        .handle(call_request(
            2,
            "execute_query",
            json!({ "sql": TARGET_QUERY, "catalog": "memory", "schema": "bullshit" }),
        ))
        .await
        .unwrap();

    let (plain, _) = tool_result(&plain);
    let (explicit, _) = tool_result(&explicit);
    assert_eq!(plain["rows"], json!([["memory", "bullshit"]]));
    assert_eq!(plain["rows"], explicit["rows"]);
    // Overrides equal to the defaults reuse the session connection.
    assert_eq!(engine.connects(), 1);
}

#[tokio::test]
async fn test_catalog_override_uses_its_own_connection() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "execute_query", json!({ "sql": TARGET_QUERY, "catalog": "tpch" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["rows"], json!([["tpch", null]]));
    assert_eq!(engine.connects(), 2);

    // Overrides are per call; the next plain call is back on the defaults.
    let response = session
        .handle(call_request(2, "execute_query", json!({ "sql": TARGET_QUERY })))
        .await
        .unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["rows"], json!([["memory", "bullshit"]]));
}

#[tokio::test]
async fn test_override_connections_are_bounded() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    for (id, catalog) in [(1, "tpch"), (2, "tpcds"), (3, "system"), (4, "hive")] {
        let response = session
            .handle(call_request(id, "execute_query", json!({ "sql": TARGET_QUERY, "catalog": catalog })))
            .await
            .unwrap();
        assert!(!tool_result(&response).1);
    }

    // One primary plus at most two overrides.
    assert_eq!(session.open_connections().await, 3);
    assert_eq!(engine.open_connections(), 3);
}

#[tokio::test]
async fn test_invalid_sql_is_a_tool_error() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "execute_query", json!({ "sql": "SELECT FROM" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(is_error);
    assert_eq!(payload["category"], "query_error");
    assert_eq!(payload["kind"], "syntax");
    assert_eq!(payload["error_name"], "SYNTAX_ERROR");
    assert!(!payload["error"].as_str().unwrap().is_empty());

    let text = response.result.unwrap()["content"][0]["text"].as_str().unwrap().to_string();
    assert!(text.contains("mismatched input"));
}

#[tokio::test]
async fn test_large_result_is_truncated() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "execute_query", json!({ "sql": "SELECT * FROM big" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["row_count"], 10);
    assert_eq!(payload["rows"].as_array().unwrap().len(), 10);
    assert_eq!(payload["truncated"], true);
}

// =============================================================================
// ARGUMENT VALIDATION
// =============================================================================

#[tokio::test]
async fn test_unknown_tool() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "drop_everything", json!({})))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
    assert!(response.error.unwrap().message.contains("drop_everything"));
}

#[tokio::test]
async fn test_missing_required_argument() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "execute_query", json!({})))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
    assert!(response.error.unwrap().message.contains("sql"));
    assert!(engine.executed().is_empty());
}

#[tokio::test]
async fn test_bad_identifier_never_reaches_engine() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(
            1,
            "list_tables",
            json!({ "catalog": "memory", "schema": "x\"; DROP TABLE t; --" }),
        ))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);

    let response = session
        .handle(call_request(2, "execute_query", json!({ "sql": "SELECT 1 AS test", "limit": 5 })))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
    assert!(engine.executed().is_empty());

    // The session stays usable.
    let response = session.handle(JsonRpcRequest::new(3, "ping", None)).await.unwrap();
    assert!(!response.is_error());
}

// =============================================================================
// METADATA TOOLS
// =============================================================================

#[tokio::test]
async fn test_list_catalogs_and_schemas() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session.handle(call_request(1, "list_catalogs", json!({}))).await.unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["catalogs"], json!(["memory", "system", "tpch"]));

    let response = session.handle(call_request(2, "list_schemas", json!({}))).await.unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["catalog"], "memory");
    assert!(payload["schemas"].as_array().unwrap().contains(&json!("bullshit")));
}

#[tokio::test]
async fn test_list_tables_and_inspect_table() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session.handle(call_request(1, "list_tables", json!({}))).await.unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["schema"], "bullshit");
    assert_eq!(payload["tables"], json!(["real_bullshit_data"]));

    let response = session
        .handle(call_request(2, "inspect_table", json!({ "table": "real_bullshit_data" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["columns"][1]["name"], "bullshit_score");
    assert_eq!(payload["columns"][1]["type"], "double");
    assert_eq!(payload["columns"][1]["comment"], "how bad");

    let statements: Vec<String> = engine.executed().into_iter().map(|(_, sql)| sql).collect();
    assert!(statements.contains(&r#"DESCRIBE "memory"."bullshit"."real_bullshit_data""#.to_string()));
}

#[tokio::test]
async fn test_listing_reports_row_cap() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "list_tables", json!({ "schema": WIDE_SCHEMA })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["tables"].as_array().unwrap().len(), 10);
    assert_eq!(payload["truncated"], true);

    let response = session.handle(call_request(2, "list_tables", json!({}))).await.unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["truncated"], false);

    let response = session.handle(call_request(3, "list_catalogs", json!({}))).await.unwrap();
    let (payload, _) = tool_result(&response);
    assert_eq!(payload["truncated"], false);
}

#[tokio::test]
async fn test_cancel_query() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(call_request(1, "cancel_query", json!({ "query_id": "20260101_000000_00001_abcde" })))
        .await
        .unwrap();
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["cancelled"], true);
    assert!(
        engine
            .executed()
            .iter()
            .any(|(_, sql)| sql.contains("kill_query(query_id => '20260101_000000_00001_abcde'"))
    );

    let response = session
        .handle(call_request(2, "cancel_query", json!({ "query_id": "x' OR '1'='1" })))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
}

// =============================================================================
// RESOURCES
// =============================================================================

#[tokio::test]
async fn test_resources_require_initialize() {
    let (server, engine) = test_server();
    let session = server.new_session();

    let response = session
        .handle(JsonRpcRequest::new(1, "resources/list", None))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32002);

    let response = session.handle(read_request(2, "trino://catalog")).await.unwrap();
    assert_eq!(error_code(&response), -32002);
    assert!(engine.executed().is_empty());
}

#[tokio::test]
async fn test_resources_list_and_templates() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session
        .handle(JsonRpcRequest::new(1, "resources/list", None))
        .await
        .unwrap();
    let resources = response.result.unwrap()["resources"].clone();
    assert_eq!(resources[0]["uri"], "trino://catalog");
    assert_eq!(resources[0]["mimeType"], "application/json");

    let response = session
        .handle(JsonRpcRequest::new(2, "resources/templates/list", None))
        .await
        .unwrap();
    let templates = response.result.unwrap()["resourceTemplates"].clone();
    let uris: Vec<&str> = templates
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["uriTemplate"].as_str().unwrap())
        .collect();
    assert!(uris.contains(&"trino://catalog/{catalog}/schema/{schema}/tables"));
    assert!(uris.contains(&"trino://catalog/{catalog}/schema/{schema}/table/{table}/columns"));
}

#[tokio::test]
async fn test_read_catalog_resources() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let response = session.handle(read_request(1, "trino://catalog")).await.unwrap();
    assert_eq!(response.result.as_ref().unwrap()["contents"][0]["uri"], "trino://catalog");
    let body = resource_body(&response);
    assert_eq!(body["catalogs"], json!(["memory", "system", "tpch"]));
    assert_eq!(body["truncated"], false);

    let response = session
        .handle(read_request(2, "trino://catalog/memory/schema/bullshit/tables"))
        .await
        .unwrap();
    assert_eq!(resource_body(&response)["tables"], json!(["real_bullshit_data"]));

    let response = session
        .handle(read_request(3, "trino://catalog/memory/schema/bullshit"))
        .await
        .unwrap();
    let body = resource_body(&response);
    assert_eq!(body["name"], "bullshit");
    assert_eq!(body["tables"], "trino://catalog/memory/schema/bullshit/tables");

    let statements: Vec<String> = engine.executed().into_iter().map(|(_, sql)| sql).collect();
    assert!(statements.contains(&r#"SHOW TABLES FROM "memory"."bullshit""#.to_string()));
}

#[tokio::test]
async fn test_read_table_and_column_resources() {
    let (server, _engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;

    let base = "trino://catalog/memory/schema/bullshit/table/real_bullshit_data";
    let response = session.handle(read_request(1, base)).await.unwrap();
    let body = resource_body(&response);
    assert_eq!(body["name"], "real_bullshit_data");
    assert_eq!(body["columns"].as_array().unwrap().len(), 2);

    let response = session
        .handle(read_request(2, &format!("{base}/column/bullshit_score")))
        .await
        .unwrap();
    let body = resource_body(&response);
    assert_eq!(body["column"]["type"], "double");
    assert_eq!(body["column"]["comment"], "how bad");

    let response = session
        .handle(read_request(3, &format!("{base}/column/missing")))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
    assert!(response.error.unwrap().message.contains("missing"));
}

#[tokio::test]
async fn test_read_bad_resource_uri() {
    let (server, engine) = test_server();
    let session = server.new_session();
    ready_session(&session).await;
    let before = engine.executed().len();

    for (id, uri) in [
        (1, "trino://nowhere"),
        (2, "trino://catalog/memory/schema/x\"y/tables"),
        (3, "file:///etc/passwd"),
    ] {
        let response = session.handle(read_request(id, uri)).await.unwrap();
        assert_eq!(error_code(&response), -32602, "{uri}");
    }
    assert_eq!(engine.executed().len(), before);

    let response = session
        .handle(JsonRpcRequest::new(4, "resources/read", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(error_code(&response), -32602);
}
