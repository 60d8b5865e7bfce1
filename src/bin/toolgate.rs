// ABOUTME: Server binary wiring CLI flags to config loading and transport startup
// ABOUTME: Runs the HTTP surface by default or the MCP stdio transport with --stdio
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Toolgate Server Binary
//!
//! Loads the declared configuration, builds the catalog, and serves it
//! over HTTP (REST + MCP), or over stdin/stdout with `--stdio`. Unless
//! `--disable-reload` is set, configuration files are watched and the
//! catalog hot-swaps on change.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use toolgate::catalog::Catalog;
use toolgate::config::{self, ConfigInput};
use toolgate::logging::{LogFormat, LoggingConfig};
use toolgate::server::{self, ServerState};
use toolgate::{mcp, watcher};
use tracing::info;

#[derive(Parser)]
#[command(name = "toolgate", version)]
#[command(about = "Configuration-driven tool gateway for LLM agents (REST + MCP)")]
pub struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to bind
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Single tools file
    #[arg(long, alias = "tools_file")]
    tools_file: Option<PathBuf>,

    /// Comma-separated list of tools files
    #[arg(long, alias = "tools_files", value_delimiter = ',')]
    tools_files: Option<Vec<PathBuf>>,

    /// Folder of tools YAML files
    #[arg(long, alias = "tools_folder")]
    tools_folder: Option<PathBuf>,

    /// Named prebuilt configuration bundle
    #[arg(long)]
    prebuilt: Option<String>,

    /// Logging output format
    #[arg(long, default_value = "standard")]
    logging_format: String,

    /// Minimum log level (DEBUG, INFO, WARN, ERROR)
    #[arg(long, default_value = "INFO")]
    log_level: String,

    /// Serve MCP over stdin/stdout instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// Export traces to GCP (requires the telemetry build)
    #[arg(long)]
    telemetry_gcp: bool,

    /// OTLP collector endpoint (requires the telemetry build)
    #[arg(long)]
    telemetry_otlp: Option<String>,

    /// Service name reported to the telemetry backend
    #[arg(long, default_value = "toolgate")]
    telemetry_service_name: String,

    /// Do not watch configuration files for changes
    #[arg(long)]
    disable_reload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let input = config_input(&args)?;
    let parsed = config::load(&input)?;
    let catalog = Catalog::build(&parsed).await?;
    let state = ServerState::new(catalog);

    // Prebuilt bundles have no files to watch.
    let watch_input = match (&input, args.disable_reload) {
        (ConfigInput::Prebuilt(_), _) | (_, true) => None,
        _ => Some(input.clone()),
    };
    let _watcher = match watch_input {
        Some(input) => Some(watcher::spawn(input, state.clone())?),
        None => None,
    };

    if args.stdio {
        mcp::stdio::run(state).await?;
        return Ok(());
    }

    let addr = format!("{}:{}", args.address, args.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid address: {e}"))?;
    server::serve(state, addr, shutdown_signal()).await?;
    info!("shutdown complete");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    // stdout belongs to the protocol in stdio mode; also clamp the level
    // so DEBUG chatter cannot drown the session.
    let level = if args.stdio && args.log_level.eq_ignore_ascii_case("debug") {
        "INFO".to_string()
    } else {
        args.log_level.clone()
    };
    let config = LoggingConfig {
        level,
        format: args.logging_format.parse::<LogFormat>()?,
        stderr_only: args.stdio,
        otlp_endpoint: args.telemetry_otlp.clone(),
        service_name: args.telemetry_service_name.clone(),
    };
    toolgate::logging::init(&config)?;
    if args.telemetry_gcp {
        tracing::warn!("--telemetry-gcp: export goes through the OTLP endpoint in this build");
    }
    Ok(())
}

fn config_input(args: &Args) -> Result<ConfigInput> {
    let mut selected: Vec<ConfigInput> = Vec::new();
    if let Some(file) = &args.tools_file {
        selected.push(ConfigInput::Files(vec![file.clone()]));
    }
    if let Some(files) = &args.tools_files {
        selected.push(ConfigInput::Files(files.clone()));
    }
    if let Some(folder) = &args.tools_folder {
        selected.push(ConfigInput::Folder(folder.clone()));
    }
    if let Some(name) = &args.prebuilt {
        selected.push(ConfigInput::Prebuilt(name.clone()));
    }
    match selected.len() {
        0 => Ok(ConfigInput::Files(vec![PathBuf::from("tools.yaml")])),
        1 => Ok(selected.remove(0)),
        _ => bail!("use only one of --tools-file, --tools-files, --tools-folder, --prebuilt"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
