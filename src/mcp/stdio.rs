// ABOUTME: MCP stdio transport reading line-delimited JSON-RPC from stdin
// ABOUTME: Reserves stdout for protocol output; logging goes to stderr
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # MCP stdio Transport
//!
//! Line-delimited JSON-RPC 2.0 on stdin/stdout for local MCP clients.
//! stdout carries protocol messages only; the logging setup routes
//! everything else to stderr when this transport is active. Tokens are
//! unavailable on this path, so claim-backed parameters and
//! `authRequired` tools fail closed.

use super::jsonrpc::{JsonRpcResponse, PARSE_ERROR};
use super::protocol::ProtocolHandler;
use crate::errors::AppResult;
use crate::server::ServerState;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Run the stdio loop until stdin closes.
///
/// # Errors
/// Returns an error when stdin/stdout become unreadable/unwritable.
pub async fn run(state: Arc<ServerState>) -> AppResult<()> {
    info!("MCP stdio transport ready");
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let tokens = HashMap::new();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| crate::errors::AppError::backend(format!("stdin read failed: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(raw) => {
                let catalog = state.catalog();
                match super::protocol::parse_request(&raw) {
                    Ok(request) => {
                        ProtocolHandler::handle(request, &catalog, &tokens, None).await
                    }
                    Err(error_response) => Some(error_response),
                }
            }
            Err(e) => {
                debug!("unparseable stdio line: {e}");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ))
            }
        };
        if let Some(response) = response {
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            stdout
                .write_all(&encoded)
                .await
                .map_err(|e| crate::errors::AppError::backend(format!("stdout write failed: {e}")))?;
            stdout
                .flush()
                .await
                .map_err(|e| crate::errors::AppError::backend(format!("stdout flush failed: {e}")))?;
        }
    }
    info!("stdin closed, stdio transport exiting");
    Ok(())
}
