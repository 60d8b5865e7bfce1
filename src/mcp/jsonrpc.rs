// ABOUTME: JSON-RPC 2.0 request, response, and error types for the MCP surface
// ABOUTME: Shared by the stdio transport and the streamable HTTP endpoint
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # JSON-RPC 2.0 Foundation
//!
//! One JSON-RPC implementation shared by every MCP transport. Requests
//! without an `id` are notifications and produce no response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Parse error (invalid JSON)
pub const PARSE_ERROR: i32 = -32700;
/// Invalid request object
pub const INVALID_REQUEST: i32 = -32600;
/// Unknown method
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Internal server error
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name to invoke
    pub method: String,
    /// Optional method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id; absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// A request without an id expects no response
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response; exactly one of `result`/`error` is present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Correlation id echoed from the request
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard codes are the `-327xx` range)
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Build a success response
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Build an error response
    #[must_use]
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let raw = r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#;
        let request: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.method, "tools/list");
        assert!(!request.is_notification());
    }

    #[test]
    fn test_notification_has_no_id() {
        let raw = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let request: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_error_response_shape() {
        let response = JsonRpcResponse::error(Some(json!(7)), METHOD_NOT_FOUND, "no such method");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], json!(-32601));
        assert_eq!(encoded["id"], json!(7));
        assert!(encoded.get("result").is_none());
    }
}
