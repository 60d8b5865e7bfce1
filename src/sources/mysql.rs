// ABOUTME: MySQL source backed by an sqlx connection pool
// ABOUTME: Decodes connection settings and exposes the pool to mysql tools
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! MySQL source (`kind: mysql`). Field-compatible with the postgres source
//! apart from the default port.

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::any::Any;
use std::sync::Arc;
use tracing::info;

/// `mysql` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MySqlConfig {
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
    3306
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: MySqlConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for MySqlConfig {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password);
        let pool = MySqlPoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::backend(format!(
                    "unable to connect to mysql source \"{}\": {e}",
                    self.name
                ))
            })?;
        info!(source = %self.name, host = %self.host, "mysql source ready");
        Ok(Arc::new(MySqlSource {
            name: self.name.clone(),
            pool,
        }))
    }
}

/// Live mysql source
pub struct MySqlSource {
    name: String,
    pool: MySqlPool,
}

impl MySqlSource {
    /// The shared connection pool, consumed by mysql tool kinds
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Source for MySqlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mysql"
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
