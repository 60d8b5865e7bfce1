// ABOUTME: MongoDB source wrapping the official driver client
// ABOUTME: Exposes a database handle to the document tool kinds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! MongoDB source (`kind: mongodb`).
//!
//! ```yaml
//! sources:
//!   docs:
//!     kind: mongodb
//!     uri: ${MONGODB_URI}
//!     database: app
//! ```

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use mongodb::{Client, Database};
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use tracing::info;

/// `mongodb` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MongoConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// Connection string (`mongodb://` or `mongodb+srv://`)
    pub uri: String,
    /// Database the tools operate on
    pub database: String,
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: MongoConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for MongoConfig {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let client = Client::with_uri_str(&self.uri).await.map_err(|e| {
            AppError::backend(format!(
                "unable to connect to mongodb source \"{}\": {e}",
                self.name
            ))
        })?;
        info!(source = %self.name, database = %self.database, "mongodb source ready");
        Ok(Arc::new(MongoSource {
            name: self.name.clone(),
            database: client.database(&self.database),
            client,
        }))
    }
}

/// Live mongodb source
pub struct MongoSource {
    name: String,
    client: Client,
    database: Database,
}

impl MongoSource {
    /// The configured database handle, consumed by document tool kinds
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl Source for MongoSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mongodb"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn close(&self) -> AppResult<()> {
        // The driver shuts its connections down when the client drops.
        self.client.clone().shutdown().await;
        Ok(())
    }
}
