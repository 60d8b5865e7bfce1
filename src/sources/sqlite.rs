// ABOUTME: SQLite source backed by an sqlx connection pool
// ABOUTME: Supports file-backed and in-memory databases
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! SQLite source (`kind: sqlite`).
//!
//! ```yaml
//! sources:
//!   local:
//!     kind: sqlite
//!     database: ./data/app.db
//! ```
//!
//! `database: ":memory:"` opens an in-memory database. An in-memory
//! database lives inside a single connection, so the pool is pinned to one
//! connection with no idle reaping in that mode.

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::any::Any;
use std::sync::Arc;
use tracing::info;

/// `sqlite` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqliteConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// Database file path, or `:memory:`
    pub database: String,
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: SqliteConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for SqliteConfig {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let in_memory = self.database == ":memory:";
        let options = SqliteConnectOptions::new()
            .filename(&self.database)
            .create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await.map_err(|e| {
            AppError::backend(format!(
                "unable to open sqlite source \"{}\": {e}",
                self.name
            ))
        })?;
        info!(source = %self.name, database = %self.database, "sqlite source ready");
        Ok(Arc::new(SqliteSource {
            name: self.name.clone(),
            pool,
        }))
    }
}

/// Live sqlite source
pub struct SqliteSource {
    name: String,
    pool: SqlitePool,
}

impl SqliteSource {
    /// The shared connection pool, consumed by sqlite tool kinds
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Source for SqliteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn close(&self) -> AppResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
