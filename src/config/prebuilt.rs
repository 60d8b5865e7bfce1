// ABOUTME: Embedded prebuilt configuration bundles selected by name
// ABOUTME: Bundles load through the normal parser as if user-supplied
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Prebuilt configuration bundles (`--prebuilt <name>`).
//!
//! Bundles are opaque YAML blobs compiled into the binary; they pass
//! through interpolation and kind dispatch exactly like user files, so a
//! bundle may reference environment variables for credentials.

use crate::errors::{AppError, AppResult};

const SQLITE_BUNDLE: &str = include_str!("prebuilt/sqlite.yaml");
const POSTGRES_BUNDLE: &str = include_str!("prebuilt/postgres.yaml");
const ALLOYDB_BUNDLE: &str = include_str!("prebuilt/alloydb.yaml");

/// Names accepted by `--prebuilt`
pub const BUNDLE_NAMES: &[&str] = &["sqlite", "postgres", "alloydb"];

/// Look up a bundle's YAML text by name
///
/// # Errors
/// Returns [`AppError::Config`] listing the known bundles when the name
/// is not recognized.
pub fn bundle(name: &str) -> AppResult<&'static str> {
    match name {
        "sqlite" => Ok(SQLITE_BUNDLE),
        "postgres" => Ok(POSTGRES_BUNDLE),
        "alloydb" => Ok(ALLOYDB_BUNDLE),
        other => Err(AppError::config(format!(
            "unknown prebuilt configuration \"{other}\" (available: {})",
            BUNDLE_NAMES.join(", ")
        ))),
    }
}
