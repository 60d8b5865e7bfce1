// ABOUTME: Generic JWT auth service verifying tokens against an issuer
// ABOUTME: Supports an HS256 shared secret or an RS256 JWKS endpoint with cached refresh
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Generic JWT verifier (`kind: jwt`).
//!
//! ```yaml
//! authServices:
//!   corp:
//!     kind: jwt
//!     issuer: https://issuer.example.com
//!     audience: toolgate
//!     jwksUri: https://issuer.example.com/.well-known/jwks.json
//! ```
//!
//! Exactly one of `jwksUri` (RS256) or `hs256Secret` must be set. JWKS
//! fetches are cached and refreshed behind a mutex; fetch failures are
//! cached briefly so a flapping issuer cannot stampede the endpoint.

use super::{AuthService, AuthServiceConfig, ClaimMap};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Keys are refetched after this interval even when lookups keep hitting
const KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
/// A failed JWKS fetch is not retried for this long
const FETCH_FAILURE_BACKOFF: Duration = Duration::from_secs(30);

/// `jwt` auth-service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JwtAuthConfig {
    #[serde(skip)]
    pub(crate) name: String,
    /// Expected `iss` claim; unchecked when absent
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim; unchecked when absent
    #[serde(default)]
    pub audience: Option<String>,
    /// JWKS endpoint for RS256 verification
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Shared secret for HS256 verification
    #[serde(default)]
    pub hs256_secret: Option<String>,
}

impl JwtAuthConfig {
    pub(crate) fn validate(&self) -> AppResult<()> {
        match (&self.jwks_uri, &self.hs256_secret) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(AppError::config(format!(
                "{}/jwksUri: oneof jwksUri, hs256Secret",
                self.name
            ))),
        }
    }
}

/// Decode a `jwt` entry from its YAML node
pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn AuthServiceConfig>> {
    let mut config: JwtAuthConfig = crate::registry::decode_entry("authServices", name, value)?;
    config.name = name.to_string();
    config.validate()?;
    Ok(Box::new(config))
}

#[async_trait]
impl AuthServiceConfig for JwtAuthConfig {
    fn kind(&self) -> &'static str {
        "jwt"
    }

    async fn initialize(&self) -> AppResult<Arc<dyn AuthService>> {
        let service = JwtAuthService::new(
            self.name.clone(),
            "jwt",
            self.issuer.clone(),
            self.audience.clone(),
            match (&self.hs256_secret, &self.jwks_uri) {
                (Some(secret), _) => KeySource::Hs256(secret.clone()),
                (None, Some(uri)) => KeySource::jwks_uri(uri.clone()),
                (None, None) => unreachable!("validated at decode"),
            },
        );
        service.warm_up().await;
        Ok(Arc::new(service))
    }
}

/// JSON Web Key as served by a JWKS endpoint (RSA members only)
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Default)]
struct JwksCache {
    keys: Vec<Jwk>,
    fetched_at: Option<Instant>,
    failed_at: Option<Instant>,
}

/// How a verifier obtains its decoding keys
pub(crate) enum KeySource {
    /// Shared-secret HS256
    Hs256(String),
    /// RS256 keys fetched from a JWKS endpoint
    Jwks {
        uri: String,
        http: reqwest::Client,
        cache: Mutex<JwksCache>,
    },
}

impl KeySource {
    pub(crate) fn jwks_uri(uri: String) -> Self {
        Self::Jwks {
            uri,
            http: reqwest::Client::new(),
            cache: Mutex::new(JwksCache::default()),
        }
    }
}

/// Live JWT verifier shared by the `jwt` and `google` kinds
pub(crate) struct JwtAuthService {
    name: String,
    kind: &'static str,
    issuer: Option<String>,
    audience: Option<String>,
    keys: KeySource,
}

impl JwtAuthService {
    pub(crate) fn new(
        name: String,
        kind: &'static str,
        issuer: Option<String>,
        audience: Option<String>,
        keys: KeySource,
    ) -> Self {
        Self {
            name,
            kind,
            issuer,
            audience,
            keys,
        }
    }

    /// Fetch keys eagerly at initialization; failures are tolerated here
    /// and retried on first use (they are cached briefly either way).
    pub(crate) async fn warm_up(&self) {
        if let KeySource::Jwks { .. } = &self.keys {
            if let Err(e) = self.decoding_key(None).await {
                warn!(service = %self.name, "initial JWKS fetch failed: {e}");
            }
        }
    }

    async fn decoding_key(&self, kid: Option<&str>) -> AppResult<(DecodingKey, Algorithm)> {
        match &self.keys {
            KeySource::Hs256(secret) => Ok((
                DecodingKey::from_secret(secret.as_bytes()),
                Algorithm::HS256,
            )),
            KeySource::Jwks { uri, http, cache } => {
                let mut cache = cache.lock().await;
                let stale = cache
                    .fetched_at
                    .is_none_or(|at| at.elapsed() > KEY_REFRESH_INTERVAL);
                let miss = kid.is_some_and(|kid| find_key(&cache.keys, Some(kid)).is_none());
                let backing_off = cache
                    .failed_at
                    .is_some_and(|at| at.elapsed() < FETCH_FAILURE_BACKOFF);
                if (stale || miss || cache.keys.is_empty()) && !backing_off {
                    match fetch_jwks(http, uri).await {
                        Ok(keys) => {
                            debug!(service = %self.name, count = keys.len(), "refreshed JWKS");
                            cache.keys = keys;
                            cache.fetched_at = Some(Instant::now());
                            cache.failed_at = None;
                        }
                        Err(e) => {
                            warn!(service = %self.name, "JWKS refresh failed: {e}");
                            cache.failed_at = Some(Instant::now());
                        }
                    }
                }
                let jwk = find_key(&cache.keys, kid).ok_or_else(|| {
                    AppError::auth(format!(
                        "no signing key available for auth service \"{}\"",
                        self.name
                    ))
                })?;
                let (n, e) = match (&jwk.n, &jwk.e) {
                    (Some(n), Some(e)) => (n.clone(), e.clone()),
                    _ => {
                        return Err(AppError::auth(format!(
                            "signing key for \"{}\" is not an RSA key",
                            self.name
                        )))
                    }
                };
                drop(cache);
                let key = DecodingKey::from_rsa_components(&n, &e)
                    .map_err(|e| AppError::auth(format!("invalid signing key: {e}")))?;
                Ok((key, Algorithm::RS256))
            }
        }
    }
}

fn find_key<'k>(keys: &'k [Jwk], kid: Option<&str>) -> Option<&'k Jwk> {
    match kid {
        Some(kid) => keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
        None => keys.iter().find(|k| k.kty == "RSA"),
    }
}

async fn fetch_jwks(http: &reqwest::Client, uri: &str) -> AppResult<Vec<Jwk>> {
    let set: JwkSet = http
        .get(uri)
        .send()
        .await?
        .error_for_status()
        .map_err(AppError::from)?
        .json()
        .await?;
    Ok(set.keys)
}

#[async_trait]
impl AuthService for JwtAuthService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn verify(&self, token: &str) -> AppResult<ClaimMap> {
        let header = decode_header(token)
            .map_err(|e| AppError::auth(format!("malformed token: {e}")))?;
        let (key, algorithm) = self.decoding_key(header.kid.as_deref()).await?;
        if header.alg != algorithm {
            return Err(AppError::auth(format!(
                "unexpected token algorithm {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(algorithm);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<serde_json::Value>(token, &key, &validation)
            .map_err(|e| AppError::auth(format!("token verification failed: {e}")))?;
        match data.claims {
            serde_json::Value::Object(claims) => Ok(claims),
            _ => Err(AppError::auth("token claims are not an object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn service(audience: Option<&str>) -> JwtAuthService {
        JwtAuthService::new(
            "test".to_string(),
            "jwt",
            Some("https://issuer.test".to_string()),
            audience.map(str::to_string),
            KeySource::Hs256("sekrit".to_string()),
        )
    }

    fn token(secret: &str, claims: &serde_json::Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_verify_extracts_claims() {
        let claims = json!({
            "iss": "https://issuer.test",
            "exp": future_exp(),
            "user_id": 42,
        });
        let verified = service(None)
            .verify(&token("sekrit", &claims))
            .await
            .unwrap();
        assert_eq!(verified.get("user_id"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let claims = json!({"iss": "https://issuer.test", "exp": future_exp()});
        let err = service(None)
            .verify(&token("wrong-secret", &claims))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let claims = json!({
            "iss": "https://issuer.test",
            "exp": chrono::Utc::now().timestamp() - 600,
        });
        let err = service(None)
            .verify(&token("sekrit", &claims))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let claims = json!({"iss": "https://other.test", "exp": future_exp()});
        let err = service(None)
            .verify(&token("sekrit", &claims))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_audience_checked_when_configured() {
        let claims = json!({
            "iss": "https://issuer.test",
            "aud": "someone-else",
            "exp": future_exp(),
        });
        let err = service(Some("toolgate"))
            .verify(&token("sekrit", &claims))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[test]
    fn test_config_requires_exactly_one_key_source() {
        let config = JwtAuthConfig {
            name: "corp".to_string(),
            issuer: None,
            audience: None,
            jwks_uri: None,
            hs256_secret: None,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "corp/jwksUri: oneof jwksUri, hs256Secret");
    }
}
