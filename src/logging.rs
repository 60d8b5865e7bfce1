// ABOUTME: Logging configuration and structured logging setup for the gateway
// ABOUTME: Supports standard and JSON formats, stderr routing for stdio mode, optional OTLP
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Logging setup.
//!
//! `--logging-format standard` renders human-readable lines; `JSON` emits
//! structured records. When the stdio MCP transport is active, stdout
//! belongs to the protocol, so all log output is routed to stderr and the
//! level is clamped to INFO or quieter.
//!
//! OpenTelemetry OTLP export is compiled in behind the `telemetry` cargo
//! feature; without it the telemetry flags log a warning and do nothing.

use crate::errors::{AppError, AppResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for terminals
    Standard,
    /// Structured JSON for log pipelines
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "json" => Ok(Self::Json),
            other => Err(AppError::config(format!(
                "invalid logging format \"{other}\" (expected standard or JSON)"
            ))),
        }
    }
}

/// Logging configuration resolved from the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level: DEBUG, INFO, WARN, ERROR
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Route everything to stderr (stdio transport owns stdout)
    pub stderr_only: bool,
    /// OTLP collector endpoint, when telemetry is enabled
    pub otlp_endpoint: Option<String>,
    /// Service name reported to the collector
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Standard,
            stderr_only: false,
            otlp_endpoint: None,
            service_name: "toolgate".to_string(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
/// Returns [`AppError::Config`] for an unparseable level filter.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_new(config.level.to_ascii_lowercase())
        .map_err(|e| AppError::config(format!("invalid log level: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);

    match (config.format, config.stderr_only) {
        (LogFormat::Standard, false) => {
            registry.with(fmt::layer()).init();
        }
        (LogFormat::Standard, true) => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        (LogFormat::Json, false) => {
            registry.with(fmt::layer().json()).init();
        }
        (LogFormat::Json, true) => {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
    }

    if config.otlp_endpoint.is_some() {
        init_telemetry(config);
    }
    Ok(())
}

#[cfg(feature = "telemetry")]
fn init_telemetry(config: &LoggingConfig) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;

    let endpoint = config
        .otlp_endpoint
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1:4317".to_string());
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build();
    match exporter {
        Ok(exporter) => {
            let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    opentelemetry_sdk::Resource::builder()
                        .with_attribute(KeyValue::new(
                            "service.name",
                            config.service_name.clone(),
                        ))
                        .build(),
                )
                .build();
            opentelemetry::global::set_tracer_provider(provider);
            tracing::info!("OTLP trace export enabled");
        }
        Err(e) => {
            tracing::warn!("unable to initialize OTLP exporter: {e}");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn init_telemetry(_config: &LoggingConfig) {
    tracing::warn!("telemetry flags set but this build lacks the `telemetry` feature");
}
