// ABOUTME: Server state owning the hot-swappable catalog and the HTTP listener
// ABOUTME: Swaps catalogs atomically and drains replaced catalogs before closing them
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Assembly
//!
//! [`ServerState`] owns the current [`Catalog`] behind an atomic pointer.
//! Request handlers load an `Arc` once per request and keep using it even
//! if a reload swaps the catalog mid-flight; the replaced catalog is
//! closed only after its reference count drains (bounded grace loop), so
//! no request ever observes a partially-initialized or closed catalog.

use crate::catalog::Catalog;
use crate::errors::{AppError, AppResult};
use arc_swap::ArcSwap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long a replaced catalog may linger before it is closed anyway
const DRAIN_GRACE: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(250);

/// Default deadline applied to every invocation
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared server state
pub struct ServerState {
    catalog: ArcSwap<Catalog>,
    /// MCP streamable-HTTP session store
    pub mcp_sessions: crate::http::mcp::SessionStore,
}

impl ServerState {
    /// Wrap an initial catalog
    #[must_use]
    pub fn new(catalog: Catalog) -> Arc<Self> {
        Arc::new(Self {
            catalog: ArcSwap::from_pointee(catalog),
            mcp_sessions: crate::http::mcp::SessionStore::new(),
        })
    }

    /// The current catalog; callers hold the `Arc` for the whole request
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.load_full()
    }

    /// Publish a new catalog and retire the old one after it drains
    pub fn swap_catalog(&self, next: Catalog) {
        let old = self.catalog.swap(Arc::new(next));
        info!("catalog swapped");
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
            // strong_count == 1 means only this drain task still holds it
            while Arc::strong_count(&old) > 1 && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            if Arc::strong_count(&old) > 1 {
                warn!("closing replaced catalog with requests still in flight");
            }
            old.close().await;
        });
    }
}

/// Bind and serve the HTTP surface until the shutdown future resolves.
///
/// # Errors
/// Returns [`AppError::Config`] when the address cannot be bound.
pub async fn serve(
    state: Arc<ServerState>,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> AppResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::config(format!("unable to bind {addr}: {e}")))?;
    info!("listening on {addr}");
    let router = crate::http::router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::backend(format!("server error: {e}")))?;
    Ok(())
}
