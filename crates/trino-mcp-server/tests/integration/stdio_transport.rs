//! Stdio transport tests.
//!
//! The transport runs over an in-memory duplex pipe; the test plays the
//! client side line by line.

use super::common::*;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trino_mcp_server::stdio::{self, StdioExit};
use trino_mcp_server::JsonRpcResponse;

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl Client {
    async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> JsonRpcResponse {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response within timeout")
            .unwrap()
            .expect("stream still open");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, text: &str) -> JsonRpcResponse {
        self.send(text).await;
        self.recv().await
    }
}

fn start() -> (Client, JoinHandle<StdioExit>, std::sync::Arc<FakeEngine>, CancellationToken) {
    let (server, engine) = test_server();
    let session = server.new_session();
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, client_write) = tokio::io::split(client_side);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(stdio::serve(
        session,
        BufReader::new(server_read),
        server_write,
        shutdown.clone(),
    ));
    let client = Client {
        writer: client_write,
        lines: BufReader::new(client_read).lines(),
    };
    (client, handle, engine, shutdown)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_ping_before_initialize() {
    let (mut client, _handle, _engine, _shutdown) = start();

    let response = client.request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
    assert_eq!(response.id, Some(json!(1)));
    assert_eq!(response.result, Some(json!({})));
}

#[tokio::test]
async fn test_tools_rejected_before_initialize() {
    let (mut client, _handle, _engine, _shutdown) = start();

    let response = client
        .request(&line(&call_request(1, "execute_query", json!({ "sql": "SELECT 1 AS test" }))))
        .await;
    assert_eq!(error_code(&response), -32002);

    let response = client.request(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
    assert_eq!(error_code(&response), -32002);
}

#[tokio::test]
async fn test_malformed_json_gets_parse_error() {
    let (mut client, _handle, _engine, _shutdown) = start();

    let response = client.request(r#"{"jsonrpc":"2.0","id":1,"method":"#).await;
    assert_eq!(error_code(&response), -32700);
    assert_eq!(response.id, None);

    // The session survives a bad line.
    let response = client.request(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).await;
    assert!(!response.is_error());
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[tokio::test]
async fn test_select_one_round_trip() {
    let (mut client, _handle, _engine, _shutdown) = start();

    let response = client.request(&line(&initialize_request(1))).await;
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "Trino MCP");
    assert!(result["capabilities"]["tools"].is_object());

    // Notifications get no answer; the next line read is the tool response.
    client
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;

    let response = client
        .request(&line(&call_request(2, "execute_query", json!({ "sql": "SELECT 1 AS test" }))))
        .await;
    assert_eq!(response.id, Some(json!(2)));
    let (payload, is_error) = tool_result(&response);
    assert!(!is_error);
    assert_eq!(payload["columns"][0]["name"], "test");
    assert_eq!(payload["rows"], json!([[1]]));
    assert_eq!(payload["row_count"], 1);
    assert_eq!(payload["truncated"], false);
}

#[tokio::test]
async fn test_responses_follow_request_order() {
    let (mut client, _handle, _engine, _shutdown) = start();
    client.request(&line(&initialize_request(1))).await;

    client.send(&line(&call_request(10, "list_catalogs", json!({})))).await;
    client.send(r#"{"jsonrpc":"2.0","id":11,"method":"ping"}"#).await;
    client.send(r#"{"jsonrpc":"2.0","id":12,"method":"tools/list"}"#).await;

    let ids: Vec<Value> = [
        client.recv().await,
        client.recv().await,
        client.recv().await,
    ]
    .into_iter()
    .map(|r| r.id.unwrap())
    .collect();
    assert_eq!(ids, vec![json!(10), json!(11), json!(12)]);
}

// =============================================================================
// SHUTDOWN
// =============================================================================

#[tokio::test]
async fn test_shutdown_request_ends_the_loop() {
    let (mut client, handle, engine, _shutdown) = start();
    client.request(&line(&initialize_request(1))).await;
    assert_eq!(engine.open_connections(), 1);

    let response = client.request(r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#).await;
    assert!(!response.is_error());

    let exit = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert_eq!(exit, StdioExit::ClientShutdown);
    assert_eq!(engine.open_connections(), 0);
}

#[tokio::test]
async fn test_end_of_input_tears_down() {
    let (mut client, handle, engine, _shutdown) = start();
    client.request(&line(&initialize_request(1))).await;
    assert_eq!(engine.open_connections(), 1);

    drop(client);

    let exit = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert_eq!(exit, StdioExit::EndOfInput);
    assert_eq!(engine.open_connections(), 0);
}

#[tokio::test]
async fn test_server_shutdown_stops_the_loop() {
    let (mut client, handle, engine, shutdown) = start();
    client.request(&line(&initialize_request(1))).await;

    shutdown.cancel();

    let exit = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert_eq!(exit, StdioExit::ServerShutdown);
    assert_eq!(engine.open_connections(), 0);
}
