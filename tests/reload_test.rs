// ABOUTME: Hot-reload tests exercising the file watcher and atomic catalog swap
// ABOUTME: Verifies new tools appear, failed reloads keep the old catalog
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolgate::catalog::Catalog;
use toolgate::config::{self, ConfigInput};
use toolgate::server::ServerState;
use toolgate::watcher;

const TOOL_A: &str = r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  a:
    kind: sqlite-execute-sql
    source: local
"#;

const TOOL_B: &str = r#"
sources:
  local:
    kind: sqlite
    database: ":memory:"
tools:
  b:
    kind: sqlite-execute-sql
    source: local
"#;

async fn state_for(input: &ConfigInput) -> Arc<ServerState> {
    let parsed = config::load(input).unwrap();
    let catalog = Catalog::build(&parsed).await.unwrap();
    ServerState::new(catalog)
}

async fn wait_for<F: Fn(&Catalog) -> bool>(state: &Arc<ServerState>, predicate: F) -> bool {
    for _ in 0..100 {
        if predicate(&state.catalog()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_rewrite_swaps_tool_catalog() {
    // S5: overwrite tools.yaml so tool a disappears and b appears.
    let dir = tempfile::tempdir().unwrap();
    let file: PathBuf = dir.path().join("tools.yaml");
    std::fs::write(&file, TOOL_A).unwrap();

    let input = ConfigInput::Files(vec![file.clone()]);
    let state = state_for(&input).await;
    assert!(state.catalog().tool("a").is_ok());

    let _watcher = watcher::spawn(input, state.clone()).unwrap();
    // Give the subscription a beat before mutating the file.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&file, TOOL_B).unwrap();

    assert!(
        wait_for(&state, |catalog| catalog.tool("b").is_ok()).await,
        "tool b never appeared"
    );
    let catalog = state.catalog();
    assert!(catalog.tool("a").is_err());
    assert!(catalog.tool("b").is_ok());
}

#[tokio::test]
async fn test_failed_reload_keeps_old_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let file: PathBuf = dir.path().join("tools.yaml");
    std::fs::write(&file, TOOL_A).unwrap();

    let input = ConfigInput::Files(vec![file.clone()]);
    let state = state_for(&input).await;
    let _watcher = watcher::spawn(input, state.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Broken config: unknown kind. The old catalog must keep serving.
    std::fs::write(&file, "tools:\n  x:\n    kind: bogus\n").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(state.catalog().tool("a").is_ok());

    // A subsequent good write recovers.
    std::fs::write(&file, TOOL_B).unwrap();
    assert!(
        wait_for(&state, |catalog| catalog.tool("b").is_ok()).await,
        "recovery reload never happened"
    );
}

#[tokio::test]
async fn test_in_flight_reference_survives_swap() {
    // Catalog atomicity: holders of the old Arc keep a complete catalog.
    let dir = tempfile::tempdir().unwrap();
    let file: PathBuf = dir.path().join("tools.yaml");
    std::fs::write(&file, TOOL_A).unwrap();

    let input = ConfigInput::Files(vec![file.clone()]);
    let state = state_for(&input).await;

    let held = state.catalog();
    let parsed = config::parse_document(TOOL_B).unwrap();
    state.swap_catalog(Catalog::build(&parsed).await.unwrap());

    // The held reference still resolves the old tool; the new catalog
    // resolves only the new one.
    assert!(held.tool("a").is_ok());
    assert!(state.catalog().tool("a").is_err());
    assert!(state.catalog().tool("b").is_ok());
}

#[tokio::test]
async fn test_folder_watch_picks_up_new_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.yaml"), TOOL_A).unwrap();

    let input = ConfigInput::Folder(dir.path().to_path_buf());
    let state = state_for(&input).await;
    let _watcher = watcher::spawn(input, state.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A distinct source name, so the two files merge cleanly.
    let tool_b = TOOL_B.replace("local", "local2");
    std::fs::write(dir.path().join("b.yaml"), tool_b).unwrap();
    assert!(
        wait_for(&state, |catalog| {
            catalog.tool("a").is_ok() && catalog.tool("b").is_ok()
        })
        .await,
        "folder reload never merged the new file"
    );
}
