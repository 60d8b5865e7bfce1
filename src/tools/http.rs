// ABOUTME: Generic HTTP tool building requests from templated method/path/body
// ABOUTME: Decodes JSON responses when the content type allows, raw text otherwise
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Generic HTTP tool (`kind: http`).
//!
//! ```yaml
//! tools:
//!   create-item:
//!     kind: http
//!     source: my-api
//!     method: POST
//!     path: /v1/items/{{.item_id}}
//!     requestBody: '{ "name": {{json .name}} }'
//!     headers:
//!       Content-Type: application/json
//!     queryParams:
//!       - name: verbose
//!         type: bool
//!         default: false
//!     templateParameters:
//!       - name: item_id
//!         type: string
//!     bodyParams:
//!       - name: name
//!         type: string
//! ```
//!
//! `queryParams` append to the URL; `templateParameters` and `bodyParams`
//! render into the path and body templates. Source-level headers and query
//! parameters apply first and can be overridden per tool.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::{AppError, AppResult};
use crate::parameters::{check_unique_names, ParamValues, Parameter};
use crate::sources::http::HttpSource;
use crate::template;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// `http` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpToolConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    /// Body template; omitted means no body
    #[serde(default)]
    pub request_body: Option<String>,
    /// Per-tool headers, overriding source defaults key-by-key
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parameters appended to the query string
    #[serde(default)]
    pub query_params: Vec<Parameter>,
    /// Parameters rendered into the body template
    #[serde(default)]
    pub body_params: Vec<Parameter>,
    /// Parameters rendered into the path and body templates
    #[serde(default)]
    pub template_parameters: Vec<Parameter>,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

pub(crate) fn decode_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: HttpToolConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    reqwest::Method::from_str(&config.method)
        .map_err(|_| AppError::config(format!("{}/method: invalid HTTP method", config.name)))?;
    let regular: Vec<Parameter> = config
        .query_params
        .iter()
        .chain(&config.body_params)
        .cloned()
        .collect();
    for p in regular.iter().chain(&config.template_parameters) {
        p.validate(&config.name)?;
    }
    check_unique_names(&config.name, &regular, &config.template_parameters)?;
    Ok(Box::new(config))
}

impl ToolConfig for HttpToolConfig {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<HttpSource>(&self.name, self.kind(), &self.source)?;
        let mut parameters = self.query_params.clone();
        parameters.extend(self.body_params.iter().cloned());
        Ok(Arc::new(HttpTool {
            config: self.clone(),
            parameters,
            source,
        }))
    }
}

/// Sends one templated request through the source's HTTP client
pub struct HttpTool {
    config: HttpToolConfig,
    parameters: Vec<Parameter>,
    source: Arc<HttpSource>,
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "http"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn template_parameters(&self) -> &[Parameter] {
        &self.config.template_parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;

        // Body params are visible to templates alongside template params.
        let mut template_values = template_params.as_map();
        for param in params.iter() {
            template_values.insert(param.name.clone(), param.value.clone());
        }

        let path = template::render(&self.config.path, &template_values)?;
        let url = format!(
            "{}/{}",
            self.source.base_url(),
            path.trim_start_matches('/')
        );
        let method = reqwest::Method::from_str(&self.config.method)
            .map_err(|_| AppError::validation("invalid HTTP method"))?;

        let mut request = self.source.client().request(method, url);
        for (key, value) in self.source.default_headers() {
            request = request.header(key.as_str(), value.as_str());
        }
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let mut query: Vec<(String, String)> = self
            .source
            .default_query_params()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for descriptor in &self.config.query_params {
            if let Some(value) = params.get(&descriptor.name) {
                query.push((descriptor.name.clone(), query_value(value)));
            }
        }
        if !query.is_empty() {
            request = request.query(&query);
        }

        if let Some(body_template) = &self.config.request_body {
            request = request.body(template::render(body_template, &template_values)?);
        }

        if let Some(timeout) = ctx.remaining() {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::backend(format!(
                "request returned {status}: {body}"
            )));
        }
        if content_type.contains("application/json") {
            serde_json::from_str(&body)
                .map_err(|e| AppError::backend(format!("invalid JSON response: {e}")))
        } else {
            Ok(Value::String(body))
        }
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
