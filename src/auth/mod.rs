// ABOUTME: Auth-service layer verifying bearer tokens into claim maps
// ABOUTME: Defines the AuthService trait and registers the built-in verifier kinds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Auth-Service Layer
//!
//! Each configured auth service produces a verifier with the contract
//! `verify(token) → claims | error`. Verifiers are stateless after
//! initialization and safe for concurrent use; signing keys are cached
//! behind a mutex with single-flighted refresh.
//!
//! A failed verification is *not* necessarily a request failure; it only
//! becomes one if a parameter or a tool's `authRequired` list needs that
//! service. The HTTP surface maps headers of the form
//! `<authServiceName>_token` to their service; MCP passes the same headers
//! through the session envelope.

pub mod google;
pub mod jwt;

use crate::errors::AppResult;
use crate::registry::AuthServiceRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Claim map extracted from a verified bearer token
pub type ClaimMap = serde_json::Map<String, serde_json::Value>;

/// A live token verifier
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Configured service name
    fn name(&self) -> &str;

    /// Kind discriminator this service was configured with
    fn kind(&self) -> &'static str;

    /// Verify a bearer token and extract its claim map
    ///
    /// # Errors
    /// Returns [`crate::errors::AppError::Auth`] when the token is
    /// malformed, the signature is invalid, or issuer/audience/expiry
    /// validation fails.
    async fn verify(&self, token: &str) -> AppResult<ClaimMap>;
}

/// Decoded auth-service configuration, ready to initialize
#[async_trait]
pub trait AuthServiceConfig: Send + Sync + std::fmt::Debug {
    /// Kind discriminator
    fn kind(&self) -> &'static str;

    /// Materialize the verifier (fetches signing keys where applicable)
    ///
    /// # Errors
    /// Returns [`crate::errors::AppError::Config`] when the configuration
    /// cannot produce a working verifier.
    async fn initialize(&self) -> AppResult<Arc<dyn AuthService>>;
}

/// Request header carrying a token for the named service
#[must_use]
pub fn token_header(service_name: &str) -> String {
    format!("{service_name}_token")
}

/// Register every built-in auth-service kind
pub(crate) fn register_defaults(registry: &mut AuthServiceRegistry) {
    registry.register("jwt", jwt::decode_config);
    registry.register("google", google::decode_config);
}
