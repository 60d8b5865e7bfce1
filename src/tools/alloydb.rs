// ABOUTME: AlloyDB control-plane tools for cluster creation and LRO polling
// ABOUTME: Implements the wait-for-operation backoff state machine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! AlloyDB admin tools.
//!
//! `alloydb-create-cluster` issues the create call and returns the
//! long-running-operation handle verbatim. `alloydb-wait-for-operation`
//! polls that handle with exponential backoff (`delay × multiplier`,
//! capped at `maxDelay`) until the operation completes, the retry budget
//! is exhausted, or the deadline of `min(request deadline, 30 min)`
//! expires. Only a successful operation yields a value; every other
//! terminal state returns an error carrying the backend error object
//! verbatim.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::{AppError, AppResult};
use crate::parameters::{ParamValues, Parameter, ParameterType};
use crate::sources::alloydb::AlloyDbSource;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hard ceiling on any single wait, regardless of the request deadline
const MAX_WAIT: Duration = Duration::from_secs(30 * 60);

/// `alloydb-create-cluster` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateClusterConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_create_cluster_description")]
    pub description: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_create_cluster_description() -> String {
    "Create an AlloyDB cluster and return the operation handle.".to_string()
}

pub(crate) fn decode_create_cluster_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: CreateClusterConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for CreateClusterConfig {
    fn kind(&self) -> &'static str {
        "alloydb-create-cluster"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<AlloyDbSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(CreateClusterTool {
            config: self.clone(),
            parameters: vec![
                Parameter::new("project", ParameterType::String, "GCP project id."),
                Parameter::new("location", ParameterType::String, "GCP region."),
                Parameter::new("cluster", ParameterType::String, "New cluster id."),
                Parameter::new(
                    "password",
                    ParameterType::String,
                    "Initial password for the postgres user.",
                ),
            ],
            source,
        }))
    }
}

/// Issues a cluster-create call and returns the LRO handle
pub struct CreateClusterTool {
    config: CreateClusterConfig,
    parameters: Vec<Parameter>,
    source: Arc<AlloyDbSource>,
}

#[async_trait]
impl Tool for CreateClusterTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "alloydb-create-cluster"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    fn requires_client_authorization(&self) -> bool {
        self.source.use_client_oauth()
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        _template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let project = required_str(&params, "project")?;
        let location = required_str(&params, "location")?;
        let cluster = required_str(&params, "cluster")?;
        let password = required_str(&params, "password")?;

        let path = format!(
            "v1/projects/{project}/locations/{location}/clusters?clusterId={cluster}"
        );
        let response = self
            .source
            .request(reqwest::Method::POST, &path, ctx.access_token.as_deref())?
            .json(&json!({"initialUser": {"password": password}}))
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(AppError::backend(format!(
                "cluster create returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}

/// `alloydb-wait-for-operation` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForOperationConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_wait_description")]
    pub description: String,
    /// Initial poll delay (humantime syntax, default 3s)
    #[serde(default = "default_delay")]
    pub delay: String,
    /// Backoff multiplier applied after every poll
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Ceiling for the poll delay (humantime syntax, default 4m)
    #[serde(default = "default_max_delay")]
    pub max_delay: String,
    /// Poll budget before the wait times out
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_wait_description() -> String {
    "Poll an AlloyDB operation until it completes.".to_string()
}

fn default_delay() -> String {
    "3s".to_string()
}

const fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> String {
    "4m".to_string()
}

const fn default_max_retries() -> u32 {
    10
}

pub(crate) fn decode_wait_for_operation_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: WaitForOperationConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    humantime::parse_duration(&config.delay)
        .map_err(|e| AppError::config(format!("{}/delay: {e}", config.name)))?;
    humantime::parse_duration(&config.max_delay)
        .map_err(|e| AppError::config(format!("{}/maxDelay: {e}", config.name)))?;
    if config.multiplier < 1.0 {
        return Err(AppError::config(format!(
            "{}/multiplier: must be at least 1",
            config.name
        )));
    }
    Ok(Box::new(config))
}

impl ToolConfig for WaitForOperationConfig {
    fn kind(&self) -> &'static str {
        "alloydb-wait-for-operation"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<AlloyDbSource>(&self.name, self.kind(), &self.source)?;
        let delay = humantime::parse_duration(&self.delay)
            .map_err(|e| AppError::config(format!("{}/delay: {e}", self.name)))?;
        let max_delay = humantime::parse_duration(&self.max_delay)
            .map_err(|e| AppError::config(format!("{}/maxDelay: {e}", self.name)))?;
        Ok(Arc::new(WaitForOperationTool {
            config: self.clone(),
            delay,
            max_delay,
            parameters: vec![
                Parameter::new("project", ParameterType::String, "GCP project id."),
                Parameter::new("location", ParameterType::String, "GCP region."),
                Parameter::new("operation", ParameterType::String, "Operation id to poll."),
            ],
            source,
        }))
    }
}

/// Poller states; only `Succeeded` carries a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationState {
    /// No status read yet
    Pending,
    /// At least one status read succeeded
    InProgress,
    /// `done=true` with no error
    Succeeded,
    /// `done=true` with an error object
    Failed,
    /// Retry budget or deadline exhausted
    TimedOut,
    /// Request context cancelled mid-poll
    Canceled,
}

/// Polls an operation handle until it reaches a terminal state
pub struct WaitForOperationTool {
    config: WaitForOperationConfig,
    delay: Duration,
    max_delay: Duration,
    parameters: Vec<Parameter>,
    source: Arc<AlloyDbSource>,
}

#[async_trait]
impl Tool for WaitForOperationTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "alloydb-wait-for-operation"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    fn requires_client_authorization(&self) -> bool {
        self.source.use_client_oauth()
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        _template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let project = required_str(&params, "project")?;
        let location = required_str(&params, "location")?;
        let operation = required_str(&params, "operation")?;
        let path =
            format!("v1/projects/{project}/locations/{location}/operations/{operation}");

        let deadline = match ctx.remaining() {
            Some(remaining) => Instant::now() + remaining.min(MAX_WAIT),
            None => Instant::now() + MAX_WAIT,
        };

        let mut state = OperationState::Pending;
        let mut delay = self.delay;
        let mut last_body = Value::Null;

        for attempt in 0..self.config.max_retries {
            if Instant::now() >= deadline {
                state = if ctx.remaining() == Some(Duration::ZERO) {
                    OperationState::Canceled
                } else {
                    OperationState::TimedOut
                };
                break;
            }

            match self.poll_once(&path, ctx.access_token.as_deref()).await {
                Ok(body) => {
                    state = OperationState::InProgress;
                    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false);
                    let error = body.get("error").filter(|e| !e.is_null()).cloned();
                    last_body = body;
                    if done {
                        state = if error.is_some() {
                            OperationState::Failed
                        } else {
                            OperationState::Succeeded
                        };
                        break;
                    }
                }
                Err(e) => {
                    debug!(operation = %operation, attempt, "operation poll failed: {e}");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                state = OperationState::TimedOut;
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
            delay = mul_duration(delay, self.config.multiplier).min(self.max_delay);
        }

        match state {
            OperationState::Succeeded => {
                let response = last_body.get("response").cloned().unwrap_or(Value::Null);
                Ok(success_value(response))
            }
            OperationState::Failed => Err(AppError::backend(format!(
                "operation \"{operation}\" failed: {}",
                last_body.get("error").unwrap_or(&Value::Null)
            ))),
            OperationState::Canceled => {
                Err(AppError::cancelled("operation wait cancelled"))
            }
            OperationState::Pending | OperationState::InProgress | OperationState::TimedOut => {
                Err(AppError::backend(format!(
                    "operation \"{operation}\" did not complete within {} polls",
                    self.config.max_retries
                )))
            }
        }
    }
}

impl WaitForOperationTool {
    async fn poll_once(&self, path: &str, access_token: Option<&str>) -> AppResult<Value> {
        let response = self
            .source
            .request(reqwest::Method::GET, path, access_token)?
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(AppError::backend(format!(
                "operation poll returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}

static INSTANCE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/([^/]+)/locations/([^/]+)/clusters/([^/]+)/instances/([^/]+)$")
        .unwrap()
});

// Instance-shaped resources get connection instructions; everything else
// returns the response object untouched.
fn success_value(response: Value) -> Value {
    let Some(name) = response.get("name").and_then(Value::as_str) else {
        return response;
    };
    let Some(captures) = INSTANCE_NAME.captures(name) else {
        return response;
    };
    let (project, region, cluster, instance) =
        (&captures[1], &captures[2], &captures[3], &captures[4]);
    Value::String(format!(
        "Your AlloyDB instance is ready.\n\n\
         Project: {project}\n\
         Region: {region}\n\
         Cluster: {cluster}\n\
         Instance: {instance}\n\n\
         Connect with:\n\
         psql \"host=$(gcloud alloydb instances describe {instance} \
         --cluster={cluster} --region={region} --project={project} \
         --format='value(ipAddress)') user=postgres dbname=postgres\""
    ))
}

fn mul_duration(duration: Duration, multiplier: f64) -> Duration {
    Duration::from_secs_f64(duration.as_secs_f64() * multiplier)
}

fn required_str<'p>(params: &'p ParamValues, name: &str) -> AppResult<&'p str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::validation(format!("parameter {name} is required")))
}
