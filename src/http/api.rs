// ABOUTME: REST endpoints for tool discovery and invocation
// ABOUTME: Maps per-service token headers to claims and shapes JSON responses
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # REST API
//!
//! - `GET /api/tool/{name}` → `{"tools": {<name>: manifest}}`
//! - `POST /api/tool/{name}/invoke` with `{param: value, ...}` →
//!   `{"result": <string>}` (stringified JSON rows, or a plain string)
//! - `GET /api/toolset/` and `GET /api/toolset/{name}` → aggregated
//!   manifest with `serverVersion`
//!
//! Bearer tokens arrive in `<authServiceName>_token` headers; an optional
//! `Authorization: Bearer` token is forwarded opaquely to sources whose
//! tools declare client-side authorization.

use crate::auth::token_header;
use crate::catalog::Catalog;
use crate::errors::{AppError, AppResult};
use crate::mcp::protocol::verify_tokens;
use crate::parameters::parse_params;
use crate::server::{ServerState, REQUEST_TIMEOUT};
use crate::tools::{is_authorized, InvocationContext};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// REST routes under `/api`
pub fn routes(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/tool/:name", get(get_tool))
        .route("/api/tool/:name/invoke", post(invoke_tool))
        .route("/api/toolset", get(get_default_toolset))
        .route("/api/toolset/", get(get_default_toolset))
        .route("/api/toolset/:name", get(get_toolset))
        .with_state(state)
}

async fn get_tool(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    let catalog = state.catalog();
    let tool = catalog.tool(&name)?;
    let mut tools = serde_json::Map::new();
    tools.insert(name, serde_json::to_value(tool.manifest())?);
    Ok(Json(json!({"tools": tools})))
}

async fn get_default_toolset(
    State(state): State<Arc<ServerState>>,
) -> AppResult<Json<Value>> {
    toolset_manifest(&state, "")
}

async fn get_toolset(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    toolset_manifest(&state, &name)
}

fn toolset_manifest(state: &Arc<ServerState>, name: &str) -> AppResult<Json<Value>> {
    let catalog = state.catalog();
    let manifest = catalog.toolset_manifest(name)?;
    Ok(Json(serde_json::to_value(manifest)?))
}

async fn invoke_tool(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> AppResult<Json<Value>> {
    let catalog = state.catalog();
    let tool = catalog.tool(&name)?;

    let body = match body {
        None => serde_json::Map::new(),
        Some(Json(Value::Object(map))) => map,
        Some(Json(Value::Null)) => serde_json::Map::new(),
        Some(_) => {
            return Err(AppError::validation("request body must be a JSON object"));
        }
    };

    let tokens = collect_tokens(&catalog, &headers);
    let claims = verify_tokens(&catalog, &tokens).await;
    let access_token = bearer_token(&headers);

    let params = parse_params(tool.parameters(), &body, &claims)?;
    let template_params = parse_params(tool.template_parameters(), &body, &claims)?;

    if !is_authorized(tool.auth_required(), &claims) {
        return Err(AppError::auth("unauthorized"));
    }

    debug!(tool = %name, "invoking tool");
    let ctx = InvocationContext {
        claims,
        tokens,
        access_token,
        deadline: Some(Instant::now() + REQUEST_TIMEOUT),
    };
    let value = tool.invoke(&ctx, params, template_params).await?;
    let result = match value {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(Json(json!({"result": result})))
}

/// Pull `<service>_token` headers for every configured auth service
pub fn collect_tokens(catalog: &Arc<Catalog>, headers: &HeaderMap) -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    for service_name in catalog.auth_services.keys() {
        if let Some(token) = headers
            .get(token_header(service_name))
            .and_then(|v| v.to_str().ok())
        {
            tokens.insert(service_name.clone(), token.to_string());
        }
    }
    tokens
}

/// The opaque `Authorization: Bearer` payload, if present
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
