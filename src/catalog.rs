// ABOUTME: Immutable catalog built from a parsed config in dependency order
// ABOUTME: Initializes auth services, sources, tools, and toolsets with cleanup on failure
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Catalog
//!
//! The catalog is the immutable in-memory projection of a parsed
//! configuration: initialized auth services, sources, tools, and resolved
//! toolsets. Build order follows the dependency DAG: auth services, then
//! sources (aborting with cleanup of already-opened handles on the first
//! failure), then tools (capability and auth-reference checks), then
//! toolsets. The empty-named default toolset always contains every tool.
//!
//! The server swaps whole catalogs atomically; in-flight requests keep
//! their `Arc` to the prior catalog until they finish.

use crate::auth::AuthService;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::sources::Source;
use crate::tools::{BuildContext, Tool, ToolManifest};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info};

/// Immutable projection of one configuration generation
pub struct Catalog {
    /// Initialized sources by name
    pub sources: HashMap<String, Arc<dyn Source>>,
    /// Initialized auth services by name
    pub auth_services: HashMap<String, Arc<dyn AuthService>>,
    /// Invocable tools by name
    pub tools: HashMap<String, Arc<dyn Tool>>,
    /// Resolved toolsets by name ("" is the default, containing all tools)
    pub toolsets: HashMap<String, Vec<String>>,
    // Reverse initialization order for teardown
    source_order: Vec<String>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("auth_services", &self.auth_services.keys().collect::<Vec<_>>())
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("toolsets", &self.toolsets)
            .field("source_order", &self.source_order)
            .finish()
    }
}

/// Aggregated manifest served for a toolset
#[derive(Debug, Serialize)]
pub struct ToolsetManifest {
    /// Gateway version the manifest was produced by
    #[serde(rename = "serverVersion")]
    pub server_version: String,
    /// Per-tool manifests keyed by tool name
    pub tools: BTreeMap<String, ToolManifest>,
}

impl Catalog {
    /// Build a catalog from a parsed configuration.
    ///
    /// # Errors
    /// Returns the first initialization or resolution error; sources
    /// opened before the failure are closed best-effort.
    pub async fn build(config: &Config) -> AppResult<Self> {
        let mut auth_services: HashMap<String, Arc<dyn AuthService>> = HashMap::new();
        for (name, entry) in &config.auth_services {
            let service = entry.initialize().await.map_err(|e| {
                AppError::config(format!("unable to initialize authService \"{name}\": {e}"))
            })?;
            auth_services.insert(name.clone(), service);
        }

        let mut sources: HashMap<String, Arc<dyn Source>> = HashMap::new();
        let mut source_order = Vec::with_capacity(config.sources.len());
        for (name, entry) in &config.sources {
            match entry.initialize().await {
                Ok(source) => {
                    sources.insert(name.clone(), source);
                    source_order.push(name.clone());
                }
                Err(e) => {
                    close_sources(&sources, &source_order).await;
                    return Err(AppError::config(format!(
                        "unable to initialize source \"{name}\": {e}"
                    )));
                }
            }
        }

        let ctx = BuildContext {
            sources: &sources,
            auth_services: &auth_services,
        };
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for (name, entry) in &config.tools {
            match entry.initialize(&ctx) {
                Ok(tool) => {
                    tools.insert(name.clone(), tool);
                }
                Err(e) => {
                    close_sources(&sources, &source_order).await;
                    return Err(e);
                }
            }
        }

        let mut toolsets: HashMap<String, Vec<String>> = HashMap::new();
        for (name, tool_names) in &config.toolsets {
            for tool_name in tool_names {
                if !tools.contains_key(tool_name) {
                    close_sources(&sources, &source_order).await;
                    return Err(AppError::config(format!(
                        "toolsets/{name}: no tool named \"{tool_name}\""
                    )));
                }
            }
            toolsets.insert(name.clone(), tool_names.clone());
        }
        let mut all_tools: Vec<String> = tools.keys().cloned().collect();
        all_tools.sort();
        toolsets.insert(String::new(), all_tools);

        info!(
            sources = sources.len(),
            auth_services = auth_services.len(),
            tools = tools.len(),
            toolsets = toolsets.len(),
            "catalog ready"
        );
        Ok(Self {
            sources,
            auth_services,
            tools,
            toolsets,
            source_order,
        })
    }

    /// Look up a tool by name
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown names.
    pub fn tool(&self, name: &str) -> AppResult<&Arc<dyn Tool>> {
        self.tools
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("no tool named \"{name}\"")))
    }

    /// Aggregate the manifest for a toolset ("" = every tool)
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown toolset names.
    pub fn toolset_manifest(&self, name: &str) -> AppResult<ToolsetManifest> {
        let tool_names = self
            .toolsets
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("no toolset named \"{name}\"")))?;
        let mut tools = BTreeMap::new();
        for tool_name in tool_names {
            if let Some(tool) = self.tools.get(tool_name) {
                tools.insert(tool_name.clone(), tool.manifest());
            }
        }
        Ok(ToolsetManifest {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            tools,
        })
    }

    /// Close every source, best-effort, in reverse initialization order
    pub async fn close(&self) {
        close_sources(&self.sources, &self.source_order).await;
    }
}

async fn close_sources(sources: &HashMap<String, Arc<dyn Source>>, order: &[String]) {
    for name in order.iter().rev() {
        if let Some(source) = sources.get(name) {
            if let Err(e) = source.close().await {
                error!(source = %name, "error closing source: {e}");
            }
        }
    }
}
