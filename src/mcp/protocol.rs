// ABOUTME: MCP protocol handlers for initialize, tools/list, and tools/call
// ABOUTME: Resolves tools from the current catalog and shapes MCP responses
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # MCP Protocol Handlers
//!
//! Transport-agnostic handling of the MCP methods. Each call resolves
//! against the catalog `Arc` captured for that request, so a concurrent
//! reload never shows a request a mixed catalog.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::catalog::Catalog;
use crate::errors::AppError;
use crate::parameters::parse_params;
use crate::server::REQUEST_TIMEOUT;
use crate::tools::{is_authorized, InvocationContext};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Supported MCP protocol versions, newest first
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// Server identity advertised in `initialize`
pub const SERVER_NAME: &str = "toolgate";

/// Transport-agnostic MCP request handling
pub struct ProtocolHandler;

impl ProtocolHandler {
    /// Handle one request; `None` means the request was a notification.
    ///
    /// `tokens` carries per-auth-service bearer tokens, and
    /// `access_token` the opaque client-authorization token, both
    /// extracted by the transport.
    pub async fn handle(
        request: JsonRpcRequest,
        catalog: &Arc<Catalog>,
        tokens: &HashMap<String, String>,
        access_token: Option<&str>,
    ) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => Some(Self::handle_initialize(&request)),
            "notifications/initialized" | "notifications/cancelled" => None,
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => Some(Self::handle_tools_list(id, catalog)),
            "tools/call" => {
                Some(Self::handle_tools_call(request, catalog, tokens, access_token).await)
            }
            other => {
                debug!(method = %other, "unknown MCP method");
                Some(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                ))
            }
        }
    }

    fn handle_initialize(request: &JsonRpcRequest) -> JsonRpcResponse {
        let requested = request
            .params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        // Unknown client versions are answered with our newest; the client
        // may disconnect if it cannot speak it.
        let negotiated = if SUPPORTED_VERSIONS.contains(&requested) {
            requested
        } else {
            SUPPORTED_VERSIONS[0]
        };
        JsonRpcResponse::success(
            request.id.clone(),
            json!({
                "protocolVersion": negotiated,
                "capabilities": {
                    "tools": {"listChanged": false}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(id: Option<Value>, catalog: &Arc<Catalog>) -> JsonRpcResponse {
        let mut names: Vec<&String> = catalog.tools.keys().collect();
        names.sort();
        let tools: Vec<Value> = names
            .iter()
            .filter_map(|name| catalog.tools.get(*name))
            .map(|tool| serde_json::to_value(tool.mcp_schema()).unwrap_or(Value::Null))
            .collect();
        JsonRpcResponse::success(id, json!({"tools": tools}))
    }

    async fn handle_tools_call(
        request: JsonRpcRequest,
        catalog: &Arc<Catalog>,
        tokens: &HashMap<String, String>,
        access_token: Option<&str>,
    ) -> JsonRpcResponse {
        let id = request.id.clone();
        let params = request.params.unwrap_or(Value::Null);
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "missing tool name");
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, "arguments must be an object")
            }
        };

        let tool = match catalog.tool(name) {
            Ok(tool) => tool,
            Err(e) => return JsonRpcResponse::error(id, e.jsonrpc_code(), e.to_string()),
        };

        let claims = verify_tokens(catalog, tokens).await;
        let parsed = parse_params(tool.parameters(), &arguments, &claims)
            .and_then(|p| {
                parse_params(tool.template_parameters(), &arguments, &claims)
                    .map(|t| (p, t))
            });
        let (params, template_params) = match parsed {
            Ok(values) => values,
            Err(e) => return JsonRpcResponse::error(id, e.jsonrpc_code(), e.to_string()),
        };

        if !is_authorized(tool.auth_required(), &claims) {
            let e = AppError::auth("unauthorized");
            return JsonRpcResponse::error(id, e.jsonrpc_code(), e.to_string());
        }

        let ctx = InvocationContext {
            claims,
            tokens: tokens.clone(),
            access_token: access_token.map(str::to_string),
            deadline: Some(Instant::now() + REQUEST_TIMEOUT),
        };
        match tool.invoke(&ctx, params, template_params).await {
            Ok(value) => {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": false
                    }),
                )
            }
            Err(e) => JsonRpcResponse::error(id, e.jsonrpc_code(), e.to_string()),
        }
    }
}

/// Verify each supplied token against its auth service; failures are not
/// request failures here, they just leave no claims for that service.
pub async fn verify_tokens(
    catalog: &Arc<Catalog>,
    tokens: &HashMap<String, String>,
) -> HashMap<String, crate::auth::ClaimMap> {
    let mut claims = HashMap::new();
    for (service_name, token) in tokens {
        let Some(service) = catalog.auth_services.get(service_name) else {
            continue;
        };
        match service.verify(token).await {
            Ok(claim_map) => {
                claims.insert(service_name.clone(), claim_map);
            }
            Err(e) => {
                warn!(service = %service_name, "token verification failed: {e}");
            }
        }
    }
    claims
}

/// Decode a raw JSON line/body into a request, shaping parse errors
pub fn parse_request(raw: &Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        JsonRpcResponse::error(
            raw.get("id").cloned(),
            super::jsonrpc::INVALID_REQUEST,
            format!("invalid request: {e}"),
        )
    })
}

