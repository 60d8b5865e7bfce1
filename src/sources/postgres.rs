// ABOUTME: PostgreSQL source backed by an sqlx connection pool
// ABOUTME: Decodes connection settings and exposes the pool to postgres tools
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! PostgreSQL source (`kind: postgres`).
//!
//! ```yaml
//! sources:
//!   my-pg:
//!     kind: postgres
//!     host: ${PG_HOST:127.0.0.1}
//!     port: 5432
//!     database: app
//!     user: ${PG_USER}
//!     password: ${PG_PASS}
//! ```

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::any::Any;
use std::sync::Arc;
use tracing::info;

/// `postgres` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostgresConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

const fn default_port() -> u16 {
    5432
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: PostgresConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for PostgresConfig {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password);
        let pool = PgPoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::backend(format!(
                    "unable to connect to postgres source \"{}\": {e}",
                    self.name
                ))
            })?;
        info!(source = %self.name, host = %self.host, "postgres source ready");
        Ok(Arc::new(PostgresSource {
            name: self.name.clone(),
            pool,
        }))
    }
}

/// Live postgres source
pub struct PostgresSource {
    name: String,
    pool: PgPool,
}

impl PostgresSource {
    /// The shared connection pool, consumed by postgres tool kinds
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Source for PostgresSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "postgres"
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
