// ABOUTME: Model-Context-Protocol surface shared by the stdio and HTTP transports
// ABOUTME: Exposes JSON-RPC types, protocol handlers, and the stdio loop
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # MCP Surface
//!
//! Implements MCP over two transports: line-delimited JSON-RPC 2.0 on
//! stdin/stdout ([`stdio`]) and streamable HTTP under `/mcp`
//! ([`crate::http::mcp`]). Both feed [`protocol`], which resolves tools
//! against the current catalog.

pub mod jsonrpc;
pub mod protocol;
pub mod stdio;
