// ABOUTME: Long-running-operation poller tests against a stubbed control plane
// ABOUTME: Covers backoff polling, terminal states, and connection instructions
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use toolgate::catalog::Catalog;
use toolgate::config;
use toolgate::parameters::parse_params;
use toolgate::tools::InvocationContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn catalog(base_url: &str) -> Catalog {
    let yaml = format!(
        r#"
sources:
  admin:
    kind: alloydb-admin
    baseUrl: {base_url}
tools:
  create_cluster:
    kind: alloydb-create-cluster
    source: admin
  wait:
    kind: alloydb-wait-for-operation
    source: admin
    delay: 50ms
    multiplier: 2
    maxDelay: 400ms
    maxRetries: 5
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

const OP_PATH: &str = "/v1/projects/P/locations/L/operations/op-1";

#[tokio::test]
async fn test_create_cluster_returns_operation_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/P/locations/L/clusters"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "op-1", "done": false})),
        )
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(
        &catalog,
        "create_cluster",
        json!({"project": "P", "location": "L", "cluster": "C", "password": "pw"}),
    )
    .await
    .unwrap();
    assert_eq!(value["name"], json!("op-1"));
    catalog.close().await;
}

#[tokio::test]
async fn test_poll_until_done_formats_connection_instructions() {
    // S3: three pending polls, then done with an instance resource name.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(OP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(OP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "response": {"name": "projects/P/locations/L/clusters/C/instances/I"}
        })))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(
        &catalog,
        "wait",
        json!({"project": "P", "location": "L", "operation": "op-1"}),
    )
    .await
    .unwrap();
    let text = value.as_str().unwrap();
    assert!(text.contains("Project: P"));
    assert!(text.contains("Region: L"));
    assert!(text.contains("Cluster: C"));
    assert!(text.contains("Instance: I"));
    catalog.close().await;
}

#[tokio::test]
async fn test_failed_operation_carries_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(OP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "error": {"code": 9, "message": "quota exceeded"}
        })))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let err = run(
        &catalog,
        "wait",
        json!({"project": "P", "location": "L", "operation": "op-1"}),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, toolgate::errors::AppError::Backend(_)));
    assert!(err.to_string().contains("quota exceeded"));
    catalog.close().await;
}

#[tokio::test]
async fn test_retry_budget_exhaustion_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(OP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let err = run(
        &catalog,
        "wait",
        json!({"project": "P", "location": "L", "operation": "op-1"}),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("did not complete within 5 polls"));
    catalog.close().await;
}

#[tokio::test]
async fn test_non_instance_success_returns_response_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(OP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "response": {"name": "projects/P/locations/L/clusters/C"}
        })))
        .mount(&server)
        .await;

    let catalog = catalog(&server.uri()).await;
    let value = run(
        &catalog,
        "wait",
        json!({"project": "P", "location": "L", "operation": "op-1"}),
    )
    .await
    .unwrap();
    assert_eq!(
        value["name"],
        json!("projects/P/locations/L/clusters/C")
    );
    catalog.close().await;
}
