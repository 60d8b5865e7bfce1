// ABOUTME: Google Sign-In auth service preset over the generic JWT verifier
// ABOUTME: Verifies Google-issued ID tokens against the public Google JWKS
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Google ID-token verifier (`kind: google`).
//!
//! ```yaml
//! authServices:
//!   my-google-auth:
//!     kind: google
//!     clientId: ${GOOGLE_CLIENT_ID}
//! ```
//!
//! Thin preset over the generic JWT verifier with Google's issuer and JWKS
//! endpoint pinned; `clientId` becomes the expected audience.

use super::jwt::{JwtAuthService, KeySource};
use super::{AuthService, AuthServiceConfig};
use crate::errors::AppResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const GOOGLE_ISSUER: &str = "https://accounts.google.com";
const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// `google` auth-service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleAuthConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// OAuth client ID the token must be issued for
    pub client_id: String,
}

/// Decode a `google` entry from its YAML node
pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn AuthServiceConfig>> {
    let mut config: GoogleAuthConfig = crate::registry::decode_entry("authServices", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

#[async_trait]
impl AuthServiceConfig for GoogleAuthConfig {
    fn kind(&self) -> &'static str {
        "google"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn AuthService>> {
        let service = JwtAuthService::new(
            self.name.clone(),
            "google",
            Some(GOOGLE_ISSUER.to_string()),
            Some(self.client_id.clone()),
            KeySource::jwks_uri(GOOGLE_JWKS_URI.to_string()),
        );
        service.warm_up().await;
        Ok(Arc::new(service))
    }
}
