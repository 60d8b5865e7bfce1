// ABOUTME: Source layer wrapping long-lived backend handles behind a common trait
// ABOUTME: Registers the built-in source kinds and defines capability downcasting
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Source Layer
//!
//! A source wraps a long-lived backend handle: a connection pool, an HTTP
//! client, a cloud API client. Sources are created when the catalog builds,
//! shared by every invocation of tools bound to them, and closed only on
//! catalog teardown (a reload produces a new catalog and disposes the old).
//!
//! Tools reach their backend through a capability downcast: a tool kind
//! declares compatibility with a source kind by downcasting
//! [`Source::as_any`] to the concrete source type at catalog build. The
//! check is an interface assertion, not a string comparison.

pub mod alloydb;
pub mod http;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::errors::AppResult;
use crate::registry::SourceRegistry;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// A live backend handle
#[async_trait]
pub trait Source: Send + Sync {
    /// Configured source name
    fn name(&self) -> &str;

    /// Kind discriminator this source was configured with
    fn kind(&self) -> &'static str;

    /// Concrete-type access for tool capability checks
    fn as_any(&self) -> &dyn Any;

    /// Owned concrete-type access; tools hold their source via this downcast
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Release the backend handle (best-effort, called on catalog teardown)
    ///
    /// # Errors
    /// Returns an error when the backend refuses a clean shutdown.
    async fn close(&self) -> AppResult<()>;
}

/// Decoded source configuration, ready to initialize
#[async_trait]
pub trait SourceConfig: Send + Sync + std::fmt::Debug {
    /// Kind discriminator
    fn kind(&self) -> &'static str;

    /// Materialize the backend handle (opens pools, builds clients)
    ///
    /// # Errors
    /// Returns [`crate::errors::AppError::Config`] or
    /// [`crate::errors::AppError::Backend`] when the backend cannot be
    /// reached or the configuration is unusable.
    async fn initialize(&self) -> AppResult<Arc<dyn Source>>;
}

/// Register every built-in source kind
pub(crate) fn register_defaults(registry: &mut SourceRegistry) {
    registry.register("postgres", postgres::decode_config);
    registry.register("mysql", mysql::decode_config);
    registry.register("sqlite", sqlite::decode_config);
    registry.register("mongodb", mongodb::decode_config);
    registry.register("http", http::decode_config);
    registry.register("alloydb-admin", alloydb::decode_config);
}
