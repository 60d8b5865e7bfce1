// ABOUTME: Generic HTTP source wrapping a reqwest client with base URL and defaults
// ABOUTME: Supplies default headers and query parameters to http tools
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Generic HTTP source (`kind: http`).
//!
//! ```yaml
//! sources:
//!   my-api:
//!     kind: http
//!     baseUrl: https://api.example.com
//!     timeout: 30s
//!     headers:
//!       Authorization: Bearer ${API_TOKEN}
//!     queryParams:
//!       api_version: "2"
//! ```

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `http` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// Prefix for every tool path (scheme + authority, optional prefix)
    pub base_url: String,
    /// Request timeout, e.g. `30s` (humantime syntax)
    #[serde(default)]
    pub timeout: Option<String>,
    /// Headers applied to every request; tools may override per-header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to every request
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: HttpConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for HttpConfig {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let timeout = match &self.timeout {
            Some(raw) => humantime::parse_duration(raw)
                .map_err(|e| AppError::config(format!("{}/timeout: {e}", self.name)))?,
            None => DEFAULT_TIMEOUT,
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::config(format!("{}: {e}", self.name)))?;
        info!(source = %self.name, base_url = %self.base_url, "http source ready");
        Ok(Arc::new(HttpSource {
            name: self.name.clone(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            headers: self.headers.clone(),
            query_params: self.query_params.clone(),
            client,
        }))
    }
}

/// Live http source
pub struct HttpSource {
    name: String,
    base_url: String,
    headers: BTreeMap<String, String>,
    query_params: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl HttpSource {
    /// The shared HTTP client
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default headers applied before tool headers
    #[must_use]
    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Default query parameters applied to every request
    #[must_use]
    pub fn default_query_params(&self) -> &BTreeMap<String, String> {
        &self.query_params
    }
}

#[async_trait]
impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "http"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn close(&self) -> AppResult<()> {
        // reqwest clients release their pool when dropped.
        Ok(())
    }
}
