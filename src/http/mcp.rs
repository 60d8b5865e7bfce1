// ABOUTME: Streamable HTTP transport for MCP with session tracking and SSE
// ABOUTME: Handles POST request batches, GET event streams, and DELETE teardown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # MCP over Streamable HTTP
//!
//! `POST /mcp` accepts a single JSON-RPC request or a batch and answers
//! in kind. An `initialize` request mints a session id returned in the
//! `Mcp-Session-Id` header; `GET /mcp` opens a server-sent-event stream
//! for that session; `DELETE /mcp` ends it. The session store is a
//! bounded LRU so abandoned sessions cannot grow without limit.

use super::api::{bearer_token, collect_tokens};
use crate::errors::AppError;
use crate::mcp::jsonrpc::{JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::protocol::{parse_request, ProtocolHandler};
use crate::server::ServerState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream::Stream;
use lru::LruCache;
use serde_json::Value;
use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Header carrying the per-session identifier
pub const SESSION_HEADER: &str = "mcp-session-id";

const MAX_SESSIONS: usize = 128;

/// Bounded store of live streamable-HTTP sessions
pub struct SessionStore {
    sessions: Mutex<LruCache<String, McpSession>>,
}

/// Book-keeping for one streamable-HTTP session
#[derive(Debug, Clone)]
pub struct McpSession {
    /// Negotiated protocol version
    pub protocol_version: String,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_SESSIONS).expect("nonzero capacity"),
            )),
        }
    }

    fn create(&self, protocol_version: String) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .expect("session store poisoned")
            .put(id.clone(), McpSession { protocol_version });
        id
    }

    fn contains(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .contains(id)
    }

    fn remove(&self, id: &str) {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .pop(id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// MCP routes under `/mcp`
pub fn routes(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_sse).delete(handle_delete),
        )
        .with_state(state)
}

async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let raw: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            let response =
                JsonRpcResponse::error(None, PARSE_ERROR, format!("parse error: {e}"));
            return Json(response).into_response();
        }
    };

    let catalog = state.catalog();
    let tokens = collect_tokens(&catalog, &headers);
    let access_token = bearer_token(&headers);

    // An initialize request (alone or in a batch) mints the session id.
    let mut minted_session: Option<String> = None;

    let payload: Option<Value> = match raw {
        Value::Array(batch) => {
            if batch.is_empty() {
                let response =
                    JsonRpcResponse::error(None, INVALID_REQUEST, "empty batch");
                return Json(response).into_response();
            }
            let mut responses = Vec::with_capacity(batch.len());
            for raw in batch {
                let handled = handle_one(
                    &state,
                    &catalog,
                    &tokens,
                    access_token.as_deref(),
                    raw,
                    &mut minted_session,
                )
                .await;
                if let Some(response) = handled {
                    responses.push(serde_json::to_value(response).unwrap_or(Value::Null));
                }
            }
            if responses.is_empty() {
                None
            } else {
                Some(Value::Array(responses))
            }
        }
        single => handle_one(
            &state,
            &catalog,
            &tokens,
            access_token.as_deref(),
            single,
            &mut minted_session,
        )
        .await
        .map(|response| serde_json::to_value(response).unwrap_or(Value::Null)),
    };

    let mut response = match payload {
        Some(payload) => Json(payload).into_response(),
        // All notifications: nothing to send back.
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(session_id) = minted_session {
        if let Ok(value) = session_id.parse() {
            response
                .headers_mut()
                .insert(HeaderName::from_static(SESSION_HEADER), value);
        }
    }
    response
}

async fn handle_one(
    state: &Arc<ServerState>,
    catalog: &Arc<crate::catalog::Catalog>,
    tokens: &std::collections::HashMap<String, String>,
    access_token: Option<&str>,
    raw: Value,
    minted_session: &mut Option<String>,
) -> Option<JsonRpcResponse> {
    match parse_request(&raw) {
        Ok(request) => {
            if request.method == "initialize" {
                let version = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                *minted_session = Some(state.mcp_sessions.create(version));
            }
            ProtocolHandler::handle(request, catalog, tokens, access_token).await
        }
        Err(error_response) => Some(error_response),
    }
}

async fn handle_sse(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation("missing Mcp-Session-Id header"))?;
    if !state.mcp_sessions.contains(&session_id) {
        return Err(AppError::not_found(format!(
            "no session \"{session_id}\""
        )));
    }
    debug!(session = %session_id, "MCP SSE stream opened");

    // No server-initiated messages yet; the stream carries keep-alives so
    // clients can hold it open per the streamable HTTP transport.
    let stream = futures_util::stream::once(async move {
        Ok(Event::default().event("connected").data(session_id))
    });
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

async fn handle_delete(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> StatusCode {
    if let Some(session_id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        state.mcp_sessions.remove(session_id);
        debug!(session = %session_id, "MCP session removed");
    }
    StatusCode::NO_CONTENT
}
