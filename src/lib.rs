// ABOUTME: Main library entry point for the Toolgate configuration-driven tool gateway
// ABOUTME: Exposes the config loader, catalog, tool layer, and HTTP/MCP surfaces
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Toolgate
//!
//! A configuration-driven tool gateway: a YAML document declares
//! **sources** (connection-bearing backends), **authServices** (token
//! verifiers), **tools** (parameterized operations bound to a source),
//! and **toolsets** (named groupings). The server validates the
//! configuration, initializes backends, and serves invocations over a
//! REST API and the Model Context Protocol (stdio and streamable HTTP),
//! hot-reloading the catalog when the configuration changes.
//!
//! ## Architecture
//!
//! - **config**: YAML loading, `${VAR}` interpolation, kind dispatch
//! - **registry**: process-wide kind → decoder maps
//! - **auth / sources / tools**: the three plugin layers
//! - **catalog**: ordered initialization into an immutable snapshot
//! - **server / watcher**: atomic catalog swap and hot reload
//! - **http / mcp**: the REST and MCP request surfaces
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use toolgate::catalog::Catalog;
//! use toolgate::config::{self, ConfigInput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let input = ConfigInput::Files(vec!["tools.yaml".into()]);
//!     let parsed = config::load(&input)?;
//!     let catalog = Catalog::build(&parsed).await?;
//!     let state = toolgate::server::ServerState::new(catalog);
//!     toolgate::server::serve(state, "127.0.0.1:5000".parse()?, async {}).await?;
//!     Ok(())
//! }
//! ```

/// Token verification services (`jwt`, `google`)
pub mod auth;

/// Catalog construction and lifecycle
pub mod catalog;

/// Configuration model, loader, and interpolation
pub mod config;

/// Error taxonomy shared by every surface
pub mod errors;

/// REST and streamable-HTTP MCP endpoints
pub mod http;

/// Logging and telemetry setup
pub mod logging;

/// MCP protocol handlers and the stdio transport
pub mod mcp;

/// Parameter descriptors, parsing, and manifests
pub mod parameters;

/// Process-wide kind registries
pub mod registry;

/// Server state and HTTP listener
pub mod server;

/// Backend handle layer (`postgres`, `mysql`, `sqlite`, `mongodb`,
/// `http`, `alloydb-admin`)
pub mod sources;

/// Statement templating (`{{.name}}`, `{{json .name}}`)
pub mod template;

/// Tool kinds and the invocation contract
pub mod tools;

/// Configuration hot reload
pub mod watcher;
