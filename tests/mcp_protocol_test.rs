// ABOUTME: MCP surface tests covering initialize, tools/list, and tools/call
// ABOUTME: Drives the protocol handler and the streamable HTTP endpoint
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use toolgate::catalog::Catalog;
use toolgate::config;
use toolgate::http::router;
use toolgate::mcp::jsonrpc::JsonRpcRequest;
use toolgate::mcp::protocol::ProtocolHandler;
use toolgate::server::ServerState;
use tower::ServiceExt;

const CONFIG: &str = r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  add:
    kind: sqlite-sql
    source: local
    description: add two numbers
    statement: SELECT ?1 + ?2 AS sum
    parameters:
      - name: a
        type: int
        description: first addend
      - name: b
        type: int
        description: second addend
"#;

async fn catalog() -> Arc<Catalog> {
    let parsed = config::parse_document(CONFIG).unwrap();
    Arc::new(Catalog::build(&parsed).await.unwrap())
}

fn request(method: &str, params: Value, id: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params: Some(params),
        id: Some(id),
    }
}

async fn handle(catalog: &Arc<Catalog>, req: JsonRpcRequest) -> Option<Value> {
    ProtocolHandler::handle(req, catalog, &HashMap::new(), None)
        .await
        .map(|response| serde_json::to_value(response).unwrap())
}

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let catalog = catalog().await;
    let response = handle(
        &catalog,
        request("initialize", json!({"protocolVersion": "2024-11-05"}), json!(1)),
    )
    .await
    .unwrap();
    assert_eq!(response["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("toolgate"));

    // Unknown client versions get our newest.
    let response = handle(
        &catalog,
        request("initialize", json!({"protocolVersion": "1999-01-01"}), json!(2)),
    )
    .await
    .unwrap();
    assert_eq!(response["result"]["protocolVersion"], json!("2025-03-26"));
}

#[tokio::test]
async fn test_tools_list_matches_declared_parameters() {
    // S4: one entry per tool with a JSON-Schema input object.
    let catalog = catalog().await;
    let response = handle(&catalog, request("tools/list", json!({}), json!(3)))
        .await
        .unwrap();
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    assert_eq!(tool["name"], json!("add"));
    assert_eq!(tool["inputSchema"]["type"], json!("object"));
    assert_eq!(
        tool["inputSchema"]["properties"]["a"]["type"],
        json!("integer")
    );
    assert_eq!(
        tool["inputSchema"]["required"],
        json!(["a", "b"])
    );
}

#[tokio::test]
async fn test_tools_call_returns_text_content() {
    let catalog = catalog().await;
    let response = handle(
        &catalog,
        request(
            "tools/call",
            json!({"name": "add", "arguments": {"a": 2, "b": 3}}),
            json!(4),
        ),
    )
    .await
    .unwrap();
    let content = &response["result"]["content"][0];
    assert_eq!(content["type"], json!("text"));
    let rows: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
    assert_eq!(rows, json!([{"sum": 5}]));
}

#[tokio::test]
async fn test_tools_call_unknown_tool_is_invalid_params() {
    let catalog = catalog().await;
    let response = handle(
        &catalog,
        request("tools/call", json!({"name": "ghost", "arguments": {}}), json!(5)),
    )
    .await
    .unwrap();
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let catalog = catalog().await;
    let response = handle(&catalog, request("resources/list", json!({}), json!(6)))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn test_notification_produces_no_response() {
    let catalog = catalog().await;
    let response = ProtocolHandler::handle(
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
            id: None,
        },
        &catalog,
        &HashMap::new(),
        None,
    )
    .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_streamable_http_initialize_mints_session() {
    let parsed = config::parse_document(CONFIG).unwrap();
    let state = ServerState::new(Catalog::build(&parsed).await.unwrap());
    let app = router(state);

    let body = json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "params": {"protocolVersion": "2025-03-26"},
        "id": 1
    });
    let response = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();

    // The SSE stream accepts the minted session and rejects strangers.
    let response = app
        .clone()
        .oneshot(
            Request::get("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::get("/mcp")
                .header("mcp-session-id", "not-a-session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // DELETE tears the session down.
    let response = app
        .clone()
        .oneshot(
            Request::delete("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::get("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_streamable_http_batch() {
    let parsed = config::parse_document(CONFIG).unwrap();
    let state = ServerState::new(Catalog::build(&parsed).await.unwrap());
    let app = router(state);

    let body = json!([
        {"jsonrpc": "2.0", "method": "ping", "id": 1},
        {"jsonrpc": "2.0", "method": "tools/list", "id": 2}
    ]);
    let response = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    let responses = payload.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], json!(1));
    assert!(responses[1]["result"]["tools"].is_array());
}
