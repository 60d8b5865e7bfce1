// ABOUTME: AlloyDB control-plane source over the admin REST API
// ABOUTME: Supports static tokens or per-invocation client OAuth forwarding
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! AlloyDB admin source (`kind: alloydb-admin`).
//!
//! ```yaml
//! sources:
//!   alloydb:
//!     kind: alloydb-admin
//!     useClientOAuth: true
//! ```
//!
//! With `useClientOAuth` the source holds only the base transport; every
//! request is authenticated with the caller's forwarded bearer token, and
//! tools on this source report `requires_client_authorization`. Otherwise
//! a static `accessToken` (typically interpolated from the environment)
//! authenticates requests. `baseUrl` is overridable for testing against a
//! stubbed control plane.

use super::{Source, SourceConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://alloydb.googleapis.com";
const USER_AGENT: &str = concat!("toolgate/", env!("CARGO_PKG_VERSION"));

/// `alloydb-admin` source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlloyDbConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// Control-plane endpoint; override for tests
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Authenticate each call with the caller's forwarded bearer token
    #[serde(default)]
    pub use_client_o_auth: bool,
    /// Static bearer token used when client OAuth is off
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn SourceConfig>> {
    let mut config: AlloyDbConfig = crate::registry::decode_entry("sources", name, value)?;
    config.name = name.to_string();
    if config.use_client_o_auth && config.access_token.is_some() {
        return Err(AppError::config(format!(
            "{}/useClientOAuth: oneof useClientOAuth, accessToken",
            config.name
        )));
    }
    Ok(Box::new(config))
}

#[async_trait]
impl SourceConfig for AlloyDbConfig {
    fn kind(&self) -> &'static str {
        "alloydb-admin"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn Source>> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::config(format!("{}: {e}", self.name)))?;
        info!(source = %self.name, client_oauth = self.use_client_o_auth, "alloydb-admin source ready");
        Ok(Arc::new(AlloyDbSource {
            name: self.name.clone(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            use_client_oauth: self.use_client_o_auth,
            access_token: self.access_token.clone(),
            client,
        }))
    }
}

/// Live alloydb-admin source
pub struct AlloyDbSource {
    name: String,
    base_url: String,
    use_client_oauth: bool,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl AlloyDbSource {
    /// Control-plane endpoint without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether tools on this source need the caller's bearer token
    #[must_use]
    pub const fn use_client_oauth(&self) -> bool {
        self.use_client_oauth
    }

    /// Build an authenticated request for a control-plane path
    ///
    /// # Errors
    /// Returns [`AppError::Auth`] when client OAuth is required but the
    /// caller supplied no bearer token.
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        client_token: Option<&str>,
    ) -> AppResult<reqwest::RequestBuilder> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        if self.use_client_oauth {
            let token = client_token.ok_or_else(|| {
                AppError::auth(format!(
                    "source \"{}\" requires a client authorization token",
                    self.name
                ))
            })?;
            Ok(builder.bearer_auth(token))
        } else if let Some(token) = &self.access_token {
            Ok(builder.bearer_auth(token))
        } else {
            Ok(builder)
        }
    }
}

#[async_trait]
impl Source for AlloyDbSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "alloydb-admin"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}
