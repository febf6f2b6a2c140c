//! Direct HTTP facade tests.

use super::common::*;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn router() -> (Router, std::sync::Arc<FakeEngine>) {
    let (server, engine) = test_server();
    let (router, _pool) = server.http_api_router(CancellationToken::new());
    (router, engine)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_query(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(path).body(Body::empty()).unwrap()).await
}

// =============================================================================
// QUERIES
// =============================================================================

#[tokio::test]
async fn test_select_one() {
    let (app, _engine) = router();

    for path in ["/query", "/api/query"] {
        let (status, body) = post_query(&app, path, json!({ "query": "SELECT 1 AS test" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["results"]["columns"][0]["name"], "test");
        assert_eq!(body["results"]["rows"], json!([[1]]));
        assert_eq!(body["results"]["row_count"], 1);
        assert!(body["formatted_results"].as_str().unwrap().starts_with("test"));
    }
}

#[tokio::test]
async fn test_catalog_override_matching_defaults() {
    let (app, engine) = router();

    let (_, plain) = post_query(&app, "/query", json!({ "query": TARGET_QUERY })).await;
    let (_, explicit) = post_query(
        &app,
        "/query",
        json!({ "query": TARGET_QUERY, "catalog": "memory", "schema": "bullshit" }),
    )
    .await;
    assert_eq!(plain["results"]["rows"], json!([["memory", "bullshit"]]));
    assert_eq!(plain["results"]["rows"], explicit["results"]["rows"]);

    // Both requests share one pooled connection.
    assert_eq!(engine.connects(), 1);
}

#[tokio::test]
async fn test_explain_prefixes_query() {
    let (app, engine) = router();

    let (status, body) = post_query(
        &app,
        "/query",
        json!({ "query": "SELECT 1 AS test", "explain": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["columns"][0]["name"], "Query Plan");
    assert_eq!(engine.executed()[0].1, "EXPLAIN SELECT 1 AS test");
}

#[tokio::test]
async fn test_invalid_sql_is_400() {
    let (app, _engine) = router();

    let (status, body) = post_query(&app, "/query", json!({ "query": "SELECT FROM" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("mismatched input"));
    assert_eq!(body.get("results"), Some(&Value::Null));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let (app, engine) = router();

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"sql": "SELECT 1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = post_query(&app, "/query", json!({ "query": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_query(
        &app,
        "/query",
        json!({ "query": "SELECT 1 AS test", "catalog": "memory; DROP" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(engine.executed().is_empty());
}

#[tokio::test]
async fn test_unreachable_engine_is_503() {
    let (app, engine) = router();
    engine.set_reachable(false);

    let (status, body) = post_query(&app, "/query", json!({ "query": "SELECT 1 AS test" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_truncated_result() {
    let (app, _engine) = router();

    let (status, body) = post_query(&app, "/query", json!({ "query": "SELECT * FROM big" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["row_count"], 10);
    assert_eq!(body["results"]["truncated"], true);
    assert!(body["formatted_results"].as_str().unwrap().ends_with("(10 rows, truncated)"));
}

// =============================================================================
// HEALTH AND USAGE
// =============================================================================

#[tokio::test]
async fn test_health_reports_engine_status() {
    let (app, engine) = router();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"]["status"], "up");
    assert!(body["timestamp"].is_string());

    engine.set_reachable(false);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engine"]["status"], "down");
}

#[tokio::test]
async fn test_usage_documentation() {
    let (app, _engine) = router();

    for path in ["/", "/api"] {
        let (status, body) = get(&app, path).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]["query"].is_string());
        assert_eq!(body["example"]["catalog"], "memory");
    }
}
