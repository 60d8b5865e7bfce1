// ABOUTME: Environment-variable interpolation applied to raw configuration text
// ABOUTME: Expands ${NAME} and ${NAME:default} forms before YAML parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-variable interpolation.
//!
//! Interpolation is a pure string transform applied to the raw config text
//! before any structural parsing. Two forms are recognized:
//!
//! - `${NAME}`: replaced with the value of `NAME`; an unset variable is a
//!   configuration error.
//! - `${NAME:default}`: replaced with the value of `NAME`, or with the
//!   literal after the colon (possibly empty) when unset. The default runs
//!   to the matching `}`.
//!
//! `NAME` is `[A-Za-z_][A-Za-z0-9_]*`. A `$` not followed by `{`, or a
//! `${...}` that does not match the grammar, passes through unchanged.

use crate::errors::{AppError, AppResult};
use regex::Regex;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").unwrap());

/// Expand `${NAME}` / `${NAME:default}` references against the process
/// environment.
///
/// # Errors
/// Returns [`AppError::Config`] when a referenced variable without a
/// default is unset.
pub fn interpolate_env(raw: &str) -> AppResult<String> {
    interpolate_with(raw, |name| std::env::var(name).ok())
}

/// Expand variable references using the supplied lookup function.
///
/// # Errors
/// Returns [`AppError::Config`] when a referenced variable without a
/// default is unset.
pub fn interpolate_with<F>(raw: &str, lookup: F) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in VAR_PATTERN.captures_iter(raw) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];
        out.push_str(&raw[last..whole.start()]);
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => match caps.get(2) {
                Some(default) => out.push_str(default.as_str()),
                None => {
                    return Err(AppError::config(format!(
                        "environment variable not found: \"{name}\""
                    )));
                }
            },
        }
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn expand(raw: &str, vars: &HashMap<String, String>) -> AppResult<String> {
        interpolate_with(raw, |name| vars.get(name).cloned())
    }

    #[test]
    fn test_simple_substitution() {
        let vars = env(&[("DB_HOST", "localhost")]);
        assert_eq!(expand("host: ${DB_HOST}", &vars).unwrap(), "host: localhost");
    }

    #[test]
    fn test_default_used_when_unset() {
        let vars = env(&[]);
        assert_eq!(
            expand("password: ${DB_PASS:changeme}", &vars).unwrap(),
            "password: changeme"
        );
    }

    #[test]
    fn test_default_ignored_when_set() {
        let vars = env(&[("DB_PASS", "hunter2")]);
        assert_eq!(
            expand("password: ${DB_PASS:changeme}", &vars).unwrap(),
            "password: hunter2"
        );
    }

    #[test]
    fn test_empty_default() {
        let vars = env(&[]);
        assert_eq!(expand("opt: '${FLAG:}'", &vars).unwrap(), "opt: ''");
    }

    #[test]
    fn test_unset_without_default_errors_exactly() {
        let vars = env(&[]);
        let err = expand("key: ${NOPE}", &vars).unwrap_err();
        assert_eq!(err.to_string(), "environment variable not found: \"NOPE\"");
    }

    #[test]
    fn test_literal_dollar_passthrough() {
        let vars = env(&[]);
        assert_eq!(
            expand("cost: $5 and $ more", &vars).unwrap(),
            "cost: $5 and $ more"
        );
    }

    #[test]
    fn test_invalid_ident_passthrough() {
        let vars = env(&[]);
        assert_eq!(expand("x: ${1BAD}", &vars).unwrap(), "x: ${1BAD}");
    }

    #[test]
    fn test_idempotent_on_materialized_text() {
        let vars = env(&[("A", "alpha")]);
        let once = expand("v: ${A} $plain", &vars).unwrap();
        let twice = expand(&once, &vars).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multiple_references_one_line() {
        let vars = env(&[("U", "app"), ("H", "db")]);
        assert_eq!(
            expand("url: ${U}@${H}:${PORT:5432}", &vars).unwrap(),
            "url: app@db:5432"
        );
    }
}
