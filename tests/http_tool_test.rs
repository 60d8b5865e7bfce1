// ABOUTME: HTTP tool tests against a stubbed upstream service
// ABOUTME: Covers templated paths/bodies, query parameters, and response decoding
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use toolgate::catalog::Catalog;
use toolgate::config;
use toolgate::parameters::parse_params;
use toolgate::tools::InvocationContext;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn catalog(base_url: &str) -> Catalog {
    let yaml = format!(
        r#"
sources:
  upstream:
    kind: http
    baseUrl: {base_url}
    headers:
      X-Source: gateway
    queryParams:
      api_version: "2"
tools:
  get_item:
    kind: http
    source: upstream
    method: GET
    path: /items/{{{{.item_id}}}}
    templateParameters:
      - name: item_id
        type: string
    queryParams:
      - name: verbose
        type: bool
        default: false
  create_item:
    kind: http
    source: upstream
    method: POST
    path: /items
    requestBody: '{{"name": {{{{json .name}}}}}}'
    headers:
      Content-Type: application/json
    bodyParams:
      - name: name
        type: string
  plain:
    kind: http
    source: upstream
    method: GET
    path: /plain
"#
    );
    let parsed = config::parse_document(&yaml).unwrap();
    Catalog::build(&parsed).await.unwrap()
}

async fn run(
    catalog: &Catalog,
    tool_name: &str,
    body: Value,
) -> Result<Value, toolgate::errors::AppError> {
    let tool = catalog.tool(tool_name)?;
    let body: Map<String, Value> = body.as_object().cloned().unwrap_or_default();
    let claims = HashMap::new();
    let params = parse_params(tool.parameters(), &body, &claims)?;
    let template_params = parse_params(tool.template_parameters(), &body, &claims)?;
    tool.invoke(&InvocationContext::default(), params, template_params)
        .await
}

#[tokio::test]
async fn test_templated_path_and_source_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/widget-7"))
        .and(header("X-Source", "gateway"))
        .and(query_param("api_version", "2"))
        .and(query_param("verbose", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "widget-7"})))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(&catalog, "get_item", json!({"item_id": "widget-7"}))
        .await
        .unwrap();
    assert_eq!(value, json!({"id": "widget-7"}));
    catalog.close().await;
}

#[tokio::test]
async fn test_json_escaped_body_rendering() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_string(r#"{"name": "a \"quoted\" name"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(&catalog, "create_item", json!({"name": "a \"quoted\" name"}))
        .await
        .unwrap();
    assert_eq!(value, json!({"ok": true}));
    catalog.close().await;
}

#[tokio::test]
async fn test_non_json_response_is_plain_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("just text"))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(&catalog, "plain", json!({})).await.unwrap();
    assert_eq!(value, json!("just text"));
    catalog.close().await;
}

#[tokio::test]
async fn test_upstream_error_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let err = run(&catalog, "plain", json!({})).await.unwrap_err();
    assert!(matches!(err, toolgate::errors::AppError::Backend(_)));
    assert!(err.to_string().contains("502"));
    catalog.close().await;
}
