// ABOUTME: HTTP surface assembling the REST API, MCP endpoint, and health routes
// ABOUTME: Builds the axum router served by the gateway
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # HTTP Surface
//!
//! `/` answers with a small health/version body; `/readiness` and
//! `/liveness` return 200 once the catalog is live (the router only
//! exists after the first catalog build, so they simply return 200).
//! `/api/...` is the REST projection of the catalog and `/mcp` the
//! streamable-HTTP MCP endpoint.

pub mod api;
pub mod mcp;

use crate::server::ServerState;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the full router for a server state
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/readiness", get(ok))
        .route("/liveness", get(ok))
        .merge(api::routes(state.clone()))
        .merge(mcp::routes(state))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": crate::mcp::protocol::SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ok() -> &'static str {
    "ok"
}
