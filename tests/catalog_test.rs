// ABOUTME: Integration tests for catalog construction and reference resolution
// ABOUTME: Covers build ordering, capability checks, and toolset materialization
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use toolgate::catalog::Catalog;
use toolgate::config;

async fn build(yaml: &str) -> Result<Catalog, toolgate::errors::AppError> {
    let parsed = config::parse_document(yaml)?;
    Catalog::build(&parsed).await
}

#[tokio::test]
async fn test_build_resolves_sources_and_toolsets() {
    let catalog = build(
        r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  q:
    kind: sqlite-execute-sql
    source: local
  lt:
    kind: sqlite-list-tables
    source: local
toolsets:
  admin:
    - q
"#,
    )
    .await
    .unwrap();

    assert!(catalog.tool("q").is_ok());
    assert!(catalog.tool("missing").is_err());
    assert_eq!(catalog.toolsets["admin"], vec!["q".to_string()]);
    // The default toolset holds every tool.
    assert_eq!(catalog.toolsets[""], vec!["lt".to_string(), "q".to_string()]);
    catalog.close().await;
}

#[tokio::test]
async fn test_unresolved_source_reference() {
    let err = build(
        r"
tools:
  q:
    kind: sqlite-execute-sql
    source: nowhere
",
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("no source named \"nowhere\""));
}

#[tokio::test]
async fn test_incompatible_source_kind() {
    let err = build(
        r"
sources:
  api:
    kind: http
    baseUrl: http://127.0.0.1:1
tools:
  q:
    kind: sqlite-execute-sql
    source: api
",
    )
    .await
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("not compatible"), "unexpected: {message}");
    assert!(message.contains("http"), "unexpected: {message}");
}

#[tokio::test]
async fn test_unresolved_auth_service_reference() {
    let err = build(
        r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  q:
    kind: sqlite-execute-sql
    source: local
    authRequired:
      - ghost
"#,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("no authService named \"ghost\""));
}

#[tokio::test]
async fn test_toolset_with_unknown_tool() {
    let err = build(
        r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  q:
    kind: sqlite-execute-sql
    source: local
toolsets:
  broken:
    - q
    - phantom
"#,
    )
    .await
    .unwrap_err();
    assert!(err
        .to_string()
        .contains("toolsets/broken: no tool named \"phantom\""));
}

#[tokio::test]
async fn test_toolset_manifest_aggregates() {
    let catalog = build(
        r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  a:
    kind: sqlite-execute-sql
    source: local
  b:
    kind: sqlite-list-tables
    source: local
"#,
    )
    .await
    .unwrap();

    let manifest = catalog.toolset_manifest("").unwrap();
    assert_eq!(manifest.tools.len(), 2);
    assert!(manifest.tools.contains_key("a"));
    assert!(catalog.toolset_manifest("nope").is_err());
    catalog.close().await;
}
