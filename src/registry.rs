// ABOUTME: Process-wide plugin registries mapping kind strings to config decoders
// ABOUTME: Backend modules register sources, auth services, and tools at process start
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Plugin Registry
//!
//! Three process-wide registries (sources, auth services, tools), each a
//! map from `kind` string to a decoder producing that kind's typed config.
//! Backend modules self-register through `register_defaults` hooks run by
//! the registry's one-time initializer; the maps are read-only afterwards
//! and are never reset across reloads.
//!
//! Duplicate registration is a programmer error and panics at startup.
//! A lookup miss during config decode is a user-facing `unknown kind`
//! diagnostic carrying the entry name.

use crate::auth::AuthServiceConfig;
use crate::errors::{AppError, AppResult};
use crate::sources::SourceConfig;
use crate::tools::ToolConfig;
use serde::de::DeserializeOwned;
use serde_yaml::Value as YamlValue;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Decoder for one source kind
pub type SourceDecoder = fn(&str, YamlValue) -> AppResult<Box<dyn SourceConfig>>;
/// Decoder for one auth-service kind
pub type AuthServiceDecoder = fn(&str, YamlValue) -> AppResult<Box<dyn AuthServiceConfig>>;
/// Decoder for one tool kind
pub type ToolDecoder = fn(&str, YamlValue) -> AppResult<Box<dyn ToolConfig>>;

/// A kind → decoder map for one config section
pub struct Registry<D> {
    section: &'static str,
    kinds: HashMap<&'static str, D>,
}

impl<D> Registry<D> {
    fn new(section: &'static str) -> Self {
        Self {
            section,
            kinds: HashMap::new(),
        }
    }

    /// Register a kind; duplicate kinds abort the process
    pub(crate) fn register(&mut self, kind: &'static str, decoder: D) {
        assert!(
            self.kinds.insert(kind, decoder).is_none(),
            "duplicate {} kind registered: {kind}",
            self.section
        );
    }

    /// Look up the decoder for an entry's kind
    ///
    /// # Errors
    /// Returns [`AppError::Config`] naming the section and entry when the
    /// kind is not registered.
    pub fn lookup(&self, kind: &str, entry_name: &str) -> AppResult<&D> {
        self.kinds.get(kind).ok_or_else(|| {
            AppError::config(format!(
                "unknown kind \"{kind}\" for {}/{entry_name}",
                self.section
            ))
        })
    }

    /// Registered kind names, for diagnostics
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Registry of source kinds
pub type SourceRegistry = Registry<SourceDecoder>;
/// Registry of auth-service kinds
pub type AuthServiceRegistry = Registry<AuthServiceDecoder>;
/// Registry of tool kinds
pub type ToolRegistry = Registry<ToolDecoder>;

/// Process-wide source registry
pub static SOURCES: LazyLock<SourceRegistry> = LazyLock::new(|| {
    let mut registry = Registry::new("sources");
    crate::sources::register_defaults(&mut registry);
    registry
});

/// Process-wide auth-service registry
pub static AUTH_SERVICES: LazyLock<AuthServiceRegistry> = LazyLock::new(|| {
    let mut registry = Registry::new("authServices");
    crate::auth::register_defaults(&mut registry);
    registry
});

/// Process-wide tool registry
pub static TOOLS: LazyLock<ToolRegistry> = LazyLock::new(|| {
    let mut registry = Registry::new("tools");
    crate::tools::register_defaults(&mut registry);
    registry
});

/// Deserialize an entry's remaining fields into a kind-specific config,
/// shaping field errors as `<name>/<field>: <constraint>`.
///
/// # Errors
/// Returns [`AppError::Config`] describing the violated constraint.
pub(crate) fn decode_entry<T: DeserializeOwned>(
    section: &str,
    name: &str,
    value: YamlValue,
) -> AppResult<T> {
    serde_yaml::from_value(value).map_err(|e| {
        let message = e.to_string();
        if let Some(rest) = message.split("missing field `").nth(1) {
            let field = rest.split('`').next().unwrap_or("?");
            AppError::config(format!("{name}/{field}: required"))
        } else if let Some(rest) = message.split("unknown field `").nth(1) {
            let field = rest.split('`').next().unwrap_or("?");
            AppError::config(format!("{name}/{field}: unknown field"))
        } else {
            AppError::config(format!("{section}/{name}: {message}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_diagnostic() {
        let err = SOURCES.lookup("not-a-kind", "db").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown kind \"not-a-kind\" for sources/db"
        );
    }

    #[test]
    fn test_builtin_kinds_registered() {
        assert!(SOURCES.lookup("postgres", "x").is_ok());
        assert!(SOURCES.lookup("sqlite", "x").is_ok());
        assert!(SOURCES.lookup("http", "x").is_ok());
        assert!(AUTH_SERVICES.lookup("google", "x").is_ok());
        assert!(TOOLS.lookup("postgres-sql", "x").is_ok());
        assert!(TOOLS.lookup("alloydb-wait-for-operation", "x").is_ok());
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn test_duplicate_registration_panics() {
        let mut registry: SourceRegistry = Registry::new("sources");
        crate::sources::register_defaults(&mut registry);
        crate::sources::register_defaults(&mut registry);
    }
}
