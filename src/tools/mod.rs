// ABOUTME: Tool layer defining the Tool trait, manifests, and invocation context
// ABOUTME: Registers the built-in tool kinds for SQL, document, HTTP, and cloud backends
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tool Layer
//!
//! A tool binds a kind-specific operation to a source. Its contract is
//! `invoke(ctx, params, templateParams) → value`; the server parses and
//! authorizes before invoking, and the tool renders templates, talks to
//! its backend, and shapes the result as plain JSON.
//!
//! Tool configs resolve their source at catalog build by downcasting to
//! the concrete source type their kind is compatible with; a mismatch is
//! a configuration error naming both kinds.

pub mod alloydb;
pub mod http;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::auth::{AuthService, ClaimMap};
use crate::errors::{AppError, AppResult};
use crate::parameters::{Parameter, ParameterManifest};
use crate::registry::ToolRegistry;
use crate::sources::Source;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ambient request state handed to every invocation
#[derive(Debug, Default)]
pub struct InvocationContext {
    /// Verified claim maps per auth service (absent means not verified)
    pub claims: HashMap<String, ClaimMap>,
    /// Raw bearer tokens per auth service
    pub tokens: HashMap<String, String>,
    /// Opaque client-authorization token forwarded from `Authorization`
    pub access_token: Option<String>,
    /// Absolute deadline for the request
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    /// Time left before the deadline, if one is set
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail fast once the deadline has passed
    ///
    /// # Errors
    /// Returns [`AppError::Cancelled`] when the deadline is exhausted.
    pub fn check_deadline(&self) -> AppResult<()> {
        if self.remaining().is_some_and(|remaining| remaining.is_zero()) {
            return Err(AppError::cancelled("request deadline exceeded"));
        }
        Ok(())
    }
}

/// JSON-safe manifest projection of a tool for client discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifest {
    /// Human-readable tool description
    pub description: String,
    /// Parameter metadata, regular parameters first, then template ones
    pub parameters: Vec<ParameterManifest>,
    /// Auth services that may authorize an invocation
    #[serde(rename = "authRequired")]
    pub auth_required: Vec<String>,
}

/// JSON Schema fragment used inside MCP tool descriptors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpInputSchema {
    /// Always `"object"`
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property schemas keyed by parameter name
    pub properties: serde_json::Map<String, Value>,
    /// Names of required properties
    pub required: Vec<String>,
}

/// MCP tool descriptor returned by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolSchema {
    /// Tool name identifier
    pub name: String,
    /// Human-readable tool description
    pub description: String,
    /// JSON Schema for the tool's input object
    #[serde(rename = "inputSchema")]
    pub input_schema: McpInputSchema,
}

/// An invocable tool bound to a source
#[async_trait]
pub trait Tool: Send + Sync {
    /// Configured tool name
    fn name(&self) -> &str;

    /// Kind discriminator this tool was configured with
    fn kind(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Regular (data-bound) parameter descriptors, in declaration order
    fn parameters(&self) -> &[Parameter];

    /// Template parameter descriptors, rendered into the statement
    fn template_parameters(&self) -> &[Parameter] {
        &[]
    }

    /// Auth services that may authorize this tool
    fn auth_required(&self) -> &[String] {
        &[]
    }

    /// Whether the caller's bearer token must be forwarded to the source
    fn requires_client_authorization(&self) -> bool {
        false
    }

    /// Manifest projection for the REST discovery endpoints
    fn manifest(&self) -> ToolManifest {
        let mut parameters: Vec<ParameterManifest> =
            self.parameters().iter().map(ParameterManifest::from).collect();
        parameters.extend(self.template_parameters().iter().map(ParameterManifest::from));
        ToolManifest {
            description: self.description().to_string(),
            parameters,
            auth_required: self.auth_required().to_vec(),
        }
    }

    /// MCP tool descriptor; claim-backed parameters are invisible to
    /// clients since their values come from verified tokens
    fn mcp_schema(&self) -> McpToolSchema {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for parameter in self
            .parameters()
            .iter()
            .chain(self.template_parameters())
            .filter(|p| p.auth_services.is_empty())
        {
            properties.insert(parameter.name.clone(), property_schema(parameter));
            if parameter.is_required() {
                required.push(parameter.name.clone());
            }
        }
        McpToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: McpInputSchema {
                schema_type: "object".to_string(),
                properties,
                required,
            },
        }
    }

    /// Run the kind-specific operation
    ///
    /// # Errors
    /// Returns [`AppError::Backend`] for driver/API failures,
    /// [`AppError::Validation`] for template failures, and
    /// [`AppError::Cancelled`] when the deadline expires.
    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: crate::parameters::ParamValues,
        template_params: crate::parameters::ParamValues,
    ) -> AppResult<Value>;
}

fn property_schema(parameter: &Parameter) -> Value {
    let mut schema = serde_json::Map::new();
    schema.insert(
        "type".to_string(),
        Value::String(parameter.param_type.json_schema_type().to_string()),
    );
    if !parameter.description.is_empty() {
        schema.insert(
            "description".to_string(),
            Value::String(parameter.description.clone()),
        );
    }
    if let Some(items) = &parameter.items {
        schema.insert("items".to_string(), property_schema(items));
    }
    Value::Object(schema)
}

/// Whether the given verified claims satisfy a tool's `authRequired` list
#[must_use]
pub fn is_authorized(auth_required: &[String], claims: &HashMap<String, ClaimMap>) -> bool {
    auth_required.is_empty() || auth_required.iter().any(|s| claims.contains_key(s))
}

/// Resolution context handed to tool configs during catalog build
pub struct BuildContext<'a> {
    /// Initialized sources by name
    pub sources: &'a HashMap<String, Arc<dyn Source>>,
    /// Initialized auth services by name
    pub auth_services: &'a HashMap<String, Arc<dyn AuthService>>,
}

impl BuildContext<'_> {
    /// Resolve a source reference and downcast it to the concrete type the
    /// tool kind is compatible with.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for unresolved names and incompatible
    /// source kinds.
    pub fn typed_source<T: Source + 'static>(
        &self,
        tool_name: &str,
        tool_kind: &str,
        source_name: &str,
    ) -> AppResult<Arc<T>> {
        let source = self.sources.get(source_name).ok_or_else(|| {
            AppError::config(format!(
                "{tool_name}/source: no source named \"{source_name}\""
            ))
        })?;
        source
            .clone()
            .as_any_arc()
            .downcast::<T>()
            .map_err(|_| {
                AppError::config(format!(
                    "{tool_name}/source: source \"{source_name}\" of kind \"{}\" is not compatible with tool kind \"{tool_kind}\"",
                    source.kind()
                ))
            })
    }

    /// Check that every `authRequired` entry names a configured service
    ///
    /// # Errors
    /// Returns [`AppError::Config`] naming the first unresolved service.
    pub fn check_auth_services(&self, tool_name: &str, auth_required: &[String]) -> AppResult<()> {
        for service in auth_required {
            if !self.auth_services.contains_key(service) {
                return Err(AppError::config(format!(
                    "{tool_name}/authRequired: no authService named \"{service}\""
                )));
            }
        }
        Ok(())
    }
}

/// Decoded tool configuration, ready to resolve against a build context
pub trait ToolConfig: Send + Sync + std::fmt::Debug {
    /// Kind discriminator
    fn kind(&self) -> &'static str;

    /// Materialize the tool, resolving its source and auth references
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for unresolved or incompatible
    /// references and invalid parameter declarations.
    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>>;
}

/// Register every built-in tool kind
pub(crate) fn register_defaults(registry: &mut ToolRegistry) {
    registry.register("postgres-sql", postgres::decode_sql_config);
    registry.register("postgres-execute-sql", postgres::decode_execute_sql_config);
    registry.register("postgres-list-tables", postgres::decode_list_tables_config);
    registry.register("postgres-list-schemas", postgres::decode_list_schemas_config);
    registry.register("mysql-sql", mysql::decode_sql_config);
    registry.register("mysql-list-tables", mysql::decode_list_tables_config);
    registry.register("sqlite-sql", sqlite::decode_sql_config);
    registry.register("sqlite-execute-sql", sqlite::decode_execute_sql_config);
    registry.register("sqlite-list-tables", sqlite::decode_list_tables_config);
    registry.register("mongodb-find", mongodb::decode_find_config);
    registry.register("mongodb-insert-many", mongodb::decode_insert_many_config);
    registry.register("http", http::decode_config);
    registry.register("alloydb-create-cluster", alloydb::decode_create_cluster_config);
    registry.register(
        "alloydb-wait-for-operation",
        alloydb::decode_wait_for_operation_config,
    );
}
