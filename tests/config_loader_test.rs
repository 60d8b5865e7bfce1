// ABOUTME: Integration tests for the configuration loader and kind dispatch
// ABOUTME: Covers section splitting, interpolation, merging, and error diagnostics
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serial_test::serial;
use toolgate::config::{self, ConfigInput};

#[test]
fn test_minimal_document_roundtrip() {
    let yaml = r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  example:
    kind: sqlite-sql
    source: local
    description: rows by country
    statement: SELECT * FROM t WHERE country = ?1
    parameters:
      - name: country
        type: string
toolsets:
  demo:
    - example
"#;
    let parsed = config::parse_document(yaml).unwrap();
    assert_eq!(parsed.sources.len(), 1);
    assert_eq!(parsed.tools.len(), 1);
    assert_eq!(parsed.toolsets["demo"], vec!["example".to_string()]);
    assert_eq!(parsed.sources["local"].kind(), "sqlite");
    assert_eq!(parsed.tools["example"].kind(), "sqlite-sql");
}

#[test]
fn test_unknown_source_kind_diagnostic() {
    let yaml = r"
sources:
  db:
    kind: not-a-db
";
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err
        .to_string()
        .contains("unknown kind \"not-a-db\" for sources/db"));
}

#[test]
fn test_unknown_tool_kind_diagnostic() {
    let yaml = r"
tools:
  t:
    kind: cobol-sql
    source: db
";
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err
        .to_string()
        .contains("unknown kind \"cobol-sql\" for tools/t"));
}

#[test]
fn test_missing_kind_diagnostic() {
    let yaml = r#"
sources:
  db:
    database: ":memory:"
"#;
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err.to_string().contains("missing \"kind\" for sources/db"));
}

#[test]
fn test_missing_required_field_diagnostic() {
    // postgres requires host/database/user/password
    let yaml = r"
sources:
  pg:
    kind: postgres
    host: localhost
";
    let err = config::parse_document(yaml).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("pg/"), "unexpected: {message}");
    assert!(message.contains("required"), "unexpected: {message}");
}

#[test]
fn test_unknown_field_rejected() {
    let yaml = r#"
sources:
  db:
    kind: sqlite
    database: ":memory:"
    flavor: cherry
"#;
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err.to_string().contains("db/flavor"));
}

#[test]
fn test_auth_sources_alias_accepted() {
    let yaml = r"
authSources:
  g:
    kind: google
    clientId: client-123
";
    let parsed = config::parse_document(yaml).unwrap();
    assert_eq!(parsed.auth_services.len(), 1);
    assert_eq!(parsed.auth_services["g"].kind(), "google");
}

#[test]
fn test_both_auth_sections_rejected() {
    let yaml = r"
authServices:
  a:
    kind: google
    clientId: one
authSources:
  b:
    kind: google
    clientId: two
";
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err.to_string().contains("both"));
}

#[test]
fn test_unknown_top_level_section_rejected() {
    let yaml = r"
widgets:
  w: {}
";
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err.to_string().contains("unknown top-level section"));
}

#[test]
#[serial]
fn test_interpolation_with_default_reaches_decoder() {
    // S6: with DB_FILE unset the default is decoded into the source.
    std::env::remove_var("DB_FILE");
    let yaml = r"
sources:
  db:
    kind: sqlite
    database: ${DB_FILE:./fallback.db}
";
    let parsed = config::parse_document(yaml).unwrap();
    assert!(format!("{:?}", parsed.sources["db"]).contains("./fallback.db"));

    std::env::set_var("DB_FILE", "/data/real.db");
    let parsed = config::parse_document(yaml).unwrap();
    assert!(format!("{:?}", parsed.sources["db"]).contains("/data/real.db"));
    std::env::remove_var("DB_FILE");
}

#[test]
#[serial]
fn test_unset_variable_without_default_fails() {
    std::env::remove_var("TOOLGATE_NO_SUCH_VAR");
    let yaml = r"
sources:
  db:
    kind: sqlite
    database: ${TOOLGATE_NO_SUCH_VAR}
";
    let err = config::parse_document(yaml).unwrap_err();
    assert!(err
        .to_string()
        .contains("environment variable not found: \"TOOLGATE_NO_SUCH_VAR\""));
}

#[test]
fn test_multi_file_merge_concatenates() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.yaml");
    let second = dir.path().join("b.yaml");
    std::fs::write(
        &first,
        "sources:\n  db:\n    kind: sqlite\n    database: \":memory:\"\n",
    )
    .unwrap();
    std::fs::write(
        &second,
        "tools:\n  q:\n    kind: sqlite-execute-sql\n    source: db\n",
    )
    .unwrap();

    let merged = config::load(&ConfigInput::Files(vec![first, second])).unwrap();
    assert_eq!(merged.sources.len(), 1);
    assert_eq!(merged.tools.len(), 1);
}

#[test]
fn test_multi_file_collision_is_named() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.yaml");
    let second = dir.path().join("b.yaml");
    let body = "sources:\n  db:\n    kind: sqlite\n    database: \":memory:\"\n";
    std::fs::write(&first, body).unwrap();
    std::fs::write(&second, body).unwrap();

    let err = config::load(&ConfigInput::Files(vec![first, second])).unwrap_err();
    assert!(err.to_string().contains("sources/db"));
}

#[test]
fn test_folder_input_reads_every_yaml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sources.yaml"),
        "sources:\n  db:\n    kind: sqlite\n    database: \":memory:\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("tools.yml"),
        "tools:\n  q:\n    kind: sqlite-execute-sql\n    source: db\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let merged = config::load(&ConfigInput::Folder(dir.path().to_path_buf())).unwrap();
    assert_eq!(merged.sources.len(), 1);
    assert_eq!(merged.tools.len(), 1);
}

#[test]
fn test_prebuilt_bundles_parse() {
    for name in ["sqlite", "alloydb"] {
        let parsed = config::load(&ConfigInput::Prebuilt(name.to_string()))
            .unwrap_or_else(|e| panic!("bundle {name} failed: {e}"));
        assert!(!parsed.tools.is_empty(), "bundle {name} has no tools");
    }
    let err = config::load(&ConfigInput::Prebuilt("nope".to_string())).unwrap_err();
    assert!(err.to_string().contains("unknown prebuilt"));
}
