// ABOUTME: Configuration model and loader for sources, auth services, tools, toolsets
// ABOUTME: Handles YAML parsing, kind dispatch, multi-file merging, and prebuilt bundles
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Configuration Loader
//!
//! A configuration document is a YAML mapping with four sections:
//! `sources`, `authServices` (alias `authSources`), `tools`, and
//! `toolsets`. Loading proceeds per input: read raw bytes → interpolate
//! environment variables → parse YAML → split sections → dispatch each
//! entry by its `kind` field to the registered decoder.
//!
//! Multiple inputs (a file list or a folder of YAML files) parse
//! independently and merge by concatenation; two inputs defining the same
//! name within the same section is a collision error.

pub mod interpolate;
pub mod prebuilt;

use crate::auth::AuthServiceConfig;
use crate::errors::{AppError, AppResult};
use crate::registry;
use crate::sources::SourceConfig;
use crate::tools::ToolConfig;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use interpolate::interpolate_env;

/// Parsed configuration, decoded but not yet initialized
#[derive(Debug, Default)]
pub struct Config {
    /// Source entries by name
    pub sources: BTreeMap<String, Box<dyn SourceConfig>>,
    /// Auth-service entries by name
    pub auth_services: BTreeMap<String, Box<dyn AuthServiceConfig>>,
    /// Tool entries by name
    pub tools: BTreeMap<String, Box<dyn ToolConfig>>,
    /// Toolset entries by name
    pub toolsets: BTreeMap<String, Vec<String>>,
}

/// Where tool configuration comes from
#[derive(Debug, Clone)]
pub enum ConfigInput {
    /// One or more explicit YAML files
    Files(Vec<PathBuf>),
    /// Every `.yaml`/`.yml` file in a folder
    Folder(PathBuf),
    /// A named embedded bundle
    Prebuilt(String),
}

impl ConfigInput {
    /// The concrete files this input currently resolves to
    ///
    /// # Errors
    /// Returns [`AppError::Config`] when the folder cannot be read.
    pub fn resolve_files(&self) -> AppResult<Vec<PathBuf>> {
        match self {
            Self::Files(paths) => Ok(paths.clone()),
            Self::Folder(dir) => {
                let mut files = Vec::new();
                let entries = std::fs::read_dir(dir).map_err(|e| {
                    AppError::config(format!("unable to read folder {}: {e}", dir.display()))
                })?;
                for entry in entries {
                    let path = entry
                        .map_err(|e| {
                            AppError::config(format!(
                                "unable to read folder {}: {e}",
                                dir.display()
                            ))
                        })?
                        .path();
                    let is_yaml = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext == "yaml" || ext == "yml");
                    if is_yaml {
                        files.push(path);
                    }
                }
                files.sort();
                Ok(files)
            }
            Self::Prebuilt(_) => Ok(Vec::new()),
        }
    }
}

/// Load and merge configuration from an input set.
///
/// # Errors
/// Returns [`AppError::Config`] for unreadable files, interpolation
/// failures, YAML errors, unknown kinds, and cross-file name collisions.
pub fn load(input: &ConfigInput) -> AppResult<Config> {
    let documents: Vec<(String, String)> = match input {
        ConfigInput::Prebuilt(name) => {
            vec![(format!("prebuilt:{name}"), prebuilt::bundle(name)?.to_string())]
        }
        _ => {
            let files = input.resolve_files()?;
            if files.is_empty() {
                return Err(AppError::config("no configuration files found"));
            }
            let mut documents = Vec::with_capacity(files.len());
            for path in files {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    AppError::config(format!("unable to read {}: {e}", path.display()))
                })?;
                documents.push((path.display().to_string(), raw));
            }
            documents
        }
    };

    let mut merged = Config::default();
    for (origin, raw) in documents {
        let parsed = parse_document(&raw)
            .map_err(|e| AppError::config(format!("{origin}: {e}")))?;
        merge(&mut merged, parsed)?;
    }
    Ok(merged)
}

/// Parse a single configuration document.
///
/// # Errors
/// Returns [`AppError::Config`] for interpolation failures, YAML errors,
/// unknown sections or kinds, and entries failing field validation.
pub fn parse_document(raw: &str) -> AppResult<Config> {
    let interpolated = interpolate_env(raw)?;
    let root: YamlValue = serde_yaml::from_str(&interpolated)
        .map_err(|e| AppError::config(format!("invalid YAML: {e}")))?;
    let YamlValue::Mapping(root) = root else {
        return Err(AppError::config("configuration must be a YAML mapping"));
    };

    let mut config = Config::default();
    let mut auth_section_seen: Option<&str> = None;

    for (key, section) in root {
        let Some(key) = key.as_str().map(str::to_string) else {
            return Err(AppError::config("section names must be strings"));
        };
        match key.as_str() {
            "sources" => {
                for (name, entry) in section_entries(&key, section)? {
                    let (kind, entry) = take_kind("sources", &name, entry)?;
                    let decoder = registry::SOURCES.lookup(&kind, &name)?;
                    config.sources.insert(name.clone(), decoder(&name, entry)?);
                }
            }
            "authServices" | "authSources" => {
                if let Some(previous) = auth_section_seen {
                    return Err(AppError::config(format!(
                        "document defines both \"{previous}\" and \"{key}\"; use one"
                    )));
                }
                auth_section_seen = Some(if key == "authServices" {
                    "authServices"
                } else {
                    "authSources"
                });
                for (name, entry) in section_entries(&key, section)? {
                    let (kind, entry) = take_kind("authServices", &name, entry)?;
                    let decoder = registry::AUTH_SERVICES.lookup(&kind, &name)?;
                    config
                        .auth_services
                        .insert(name.clone(), decoder(&name, entry)?);
                }
            }
            "tools" => {
                for (name, entry) in section_entries(&key, section)? {
                    let (kind, entry) = take_kind("tools", &name, entry)?;
                    let decoder = registry::TOOLS.lookup(&kind, &name)?;
                    config.tools.insert(name.clone(), decoder(&name, entry)?);
                }
            }
            "toolsets" => {
                let YamlValue::Mapping(section) = section else {
                    return Err(AppError::config("toolsets must be a mapping"));
                };
                for (name, entry) in section {
                    let Some(name) = name.as_str().map(str::to_string) else {
                        return Err(AppError::config("toolset names must be strings"));
                    };
                    let tool_names: Vec<String> = serde_yaml::from_value(entry).map_err(|e| {
                        AppError::config(format!("toolsets/{name}: {e}"))
                    })?;
                    config.toolsets.insert(name, tool_names);
                }
            }
            other => {
                return Err(AppError::config(format!(
                    "unknown top-level section \"{other}\""
                )));
            }
        }
    }
    Ok(config)
}

fn section_entries(section: &str, value: YamlValue) -> AppResult<Vec<(String, YamlValue)>> {
    let YamlValue::Mapping(mapping) = value else {
        return Err(AppError::config(format!("{section} must be a mapping")));
    };
    let mut entries = Vec::with_capacity(mapping.len());
    for (name, entry) in mapping {
        let Some(name) = name.as_str().map(str::to_string) else {
            return Err(AppError::config(format!(
                "{section} entry names must be strings"
            )));
        };
        entries.push((name, entry));
    }
    Ok(entries)
}

// Two-phase decode: read `kind` first, hand the rest to its decoder.
fn take_kind(
    section: &str,
    name: &str,
    entry: YamlValue,
) -> AppResult<(String, YamlValue)> {
    let YamlValue::Mapping(mut mapping) = entry else {
        return Err(AppError::config(format!(
            "{section}/{name} must be a mapping"
        )));
    };
    let kind_key = YamlValue::String("kind".to_string());
    let kind = mapping
        .remove(&kind_key)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| {
            AppError::config(format!("missing \"kind\" for {section}/{name}"))
        })?;
    Ok((kind, YamlValue::Mapping(mapping)))
}

fn merge(into: &mut Config, from: Config) -> AppResult<()> {
    for (name, entry) in from.sources {
        if into.sources.insert(name.clone(), entry).is_some() {
            return Err(collision("sources", &name));
        }
    }
    for (name, entry) in from.auth_services {
        if into.auth_services.insert(name.clone(), entry).is_some() {
            return Err(collision("authServices", &name));
        }
    }
    for (name, entry) in from.tools {
        if into.tools.insert(name.clone(), entry).is_some() {
            return Err(collision("tools", &name));
        }
    }
    for (name, entry) in from.toolsets {
        if into.toolsets.insert(name.clone(), entry).is_some() {
            return Err(collision("toolsets", &name));
        }
    }
    Ok(())
}

fn collision(section: &str, name: &str) -> AppError {
    AppError::config(format!(
        "{section}/{name} is defined in more than one configuration file"
    ))
}

/// Watch set law: the directories to observe for a given input
#[must_use]
pub fn watch_dirs(input: &ConfigInput) -> Vec<PathBuf> {
    match input {
        ConfigInput::Files(paths) => {
            let mut dirs: Vec<PathBuf> = paths
                .iter()
                .map(|p| {
                    p.parent()
                        .filter(|parent| !parent.as_os_str().is_empty())
                        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
                })
                .collect();
            dirs.sort();
            dirs.dedup();
            dirs
        }
        ConfigInput::Folder(dir) => vec![dir.clone()],
        ConfigInput::Prebuilt(_) => Vec::new(),
    }
}
