// ABOUTME: Filesystem watcher driving configuration hot reload
// ABOUTME: Debounces editor save bursts and swaps the catalog only on a clean rebuild
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Reload Watcher
//!
//! The watcher observes the parent directories of every tracked
//! configuration file (or the configured folder itself), filters events
//! down to writes/creates/renames of tracked files, debounces briefly to
//! coalesce editor save bursts, and re-runs the loader → catalog-build
//! pipeline. A successful rebuild swaps the server's catalog atomically;
//! a failed one logs the error and leaves the old catalog serving. The
//! system never serves a partially-initialized catalog.

use crate::catalog::Catalog;
use crate::config::{self, ConfigInput};
use crate::errors::{AppError, AppResult};
use crate::server::ServerState;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Debounce window coalescing editor-save event bursts
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Live watcher; dropping it stops reloads
pub struct ReloadWatcher {
    // Held for its side effect; the OS subscription dies with it.
    _watcher: notify::RecommendedWatcher,
}

/// Start watching the input's directories and hot-swap the catalog on
/// relevant changes.
///
/// # Errors
/// Returns [`AppError::Config`] when the filesystem subscription cannot
/// be established.
pub fn spawn(input: ConfigInput, state: Arc<ServerState>) -> AppResult<ReloadWatcher> {
    let dirs = config::watch_dirs(&input);
    if dirs.is_empty() {
        return Err(AppError::config("nothing to watch for this input"));
    }

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        if let Ok(event) = result {
            let _ = tx.send(event);
        }
    })
    .map_err(|e| AppError::config(format!("unable to create file watcher: {e}")))?;

    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                AppError::config(format!("unable to watch {}: {e}", dir.display()))
            })?;
    }
    info!(dirs = ?dirs, "watching configuration for changes");

    tokio::spawn(watch_loop(input, state, rx));
    Ok(ReloadWatcher { _watcher: watcher })
}

async fn watch_loop(
    input: ConfigInput,
    state: Arc<ServerState>,
    mut rx: mpsc::UnboundedReceiver<Event>,
) {
    while let Some(event) = rx.recv().await {
        if !is_relevant(&input, &event) {
            continue;
        }
        debug!(paths = ?event.paths, "configuration change detected");

        // Swallow the burst an editor save produces.
        loop {
            match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(_) => break,
            }
        }

        reload(&input, &state).await;
    }
}

async fn reload(input: &ConfigInput, state: &Arc<ServerState>) {
    let config = match config::load(input) {
        Ok(config) => config,
        Err(e) => {
            error!("reload failed, keeping current catalog: {e}");
            return;
        }
    };
    match Catalog::build(&config).await {
        Ok(catalog) => {
            state.swap_catalog(catalog);
            info!("configuration reloaded");
        }
        Err(e) => {
            error!("reload failed, keeping current catalog: {e}");
        }
    }
}

fn is_relevant(input: &ConfigInput, event: &Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    match input {
        ConfigInput::Files(tracked) => event
            .paths
            .iter()
            .any(|path| tracked.iter().any(|t| same_file(t, path))),
        ConfigInput::Folder(_) => event.paths.iter().any(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        }),
        ConfigInput::Prebuilt(_) => false,
    }
}

// Event paths are absolute; tracked paths may be relative. Compare by
// file name plus canonicalized parent when possible.
fn same_file(tracked: &Path, event_path: &Path) -> bool {
    if tracked == event_path {
        return true;
    }
    if tracked.file_name() != event_path.file_name() {
        return false;
    }
    match (parent_canonical(tracked), parent_canonical(event_path)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn parent_canonical(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    parent.canonicalize().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_dirs_for_single_file() {
        let input = ConfigInput::Files(vec![PathBuf::from("/etc/toolgate/tools.yaml")]);
        assert_eq!(
            config::watch_dirs(&input),
            vec![PathBuf::from("/etc/toolgate")]
        );
    }

    #[test]
    fn test_watch_dirs_for_file_list_dedupes() {
        let input = ConfigInput::Files(vec![
            PathBuf::from("/a/x.yaml"),
            PathBuf::from("/b/y.yaml"),
            PathBuf::from("/a/z.yaml"),
        ]);
        assert_eq!(
            config::watch_dirs(&input),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn test_watch_dirs_for_folder() {
        let input = ConfigInput::Folder(PathBuf::from("/etc/toolgate"));
        assert_eq!(
            config::watch_dirs(&input),
            vec![PathBuf::from("/etc/toolgate")]
        );
    }

    #[test]
    fn test_folder_events_filter_to_yaml() {
        let input = ConfigInput::Folder(PathBuf::from("/cfg"));
        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/tools.yaml"));
        assert!(is_relevant(&input, &event));

        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/notes.txt"));
        assert!(!is_relevant(&input, &event));
    }

    #[test]
    fn test_non_content_events_ignored() {
        let input = ConfigInput::Folder(PathBuf::from("/cfg"));
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/cfg/tools.yaml"));
        assert!(!is_relevant(&input, &event));
    }
}
