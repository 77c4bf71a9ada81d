#![forbid(unsafe_code)]

//! `mcp-switchboard`: MCP runtime server binary.
//!
//! Loads configuration, installs the built-in catalog and serves it over
//! stdio and/or HTTP (WebSocket, SSE, stateless RPC) until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_switchboard::config::GlobalConfig;
use mcp_switchboard::mcp::builtin;
use mcp_switchboard::server::{self, AppState};
use mcp_switchboard::transport::stdio;
use mcp_switchboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum TransportMode {
    /// Newline-delimited JSON over stdin/stdout only.
    Stdio,
    /// WebSocket, SSE and stateless RPC on the HTTP port only.
    Http,
    /// Both.
    All,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-switchboard", about = "MCP runtime server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transports to start.
    #[arg(long, value_enum, default_value_t = TransportMode::All)]
    transport: TransportMode,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override `server.http_port`.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mcp-switchboard bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    info!(
        name = %config.server.name,
        legacy_dialect = config.protocol.legacy_dialect,
        "configuration loaded"
    );

    // ── Build shared application state ──────────────────
    let state = Arc::new(AppState::new(config));
    builtin::install(&state.catalog, &state.hub);

    // ── Start transports ────────────────────────────────
    let stdio_handle = matches!(args.transport, TransportMode::Stdio | TransportMode::All).then(|| {
        let stdio_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = stdio::serve_stdio(stdio_state).await {
                error!(%err, "stdio transport failed");
            }
        })
    });

    let http_handle = matches!(args.transport, TransportMode::Http | TransportMode::All).then(|| {
        let http_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = server::serve_http(http_state).await {
                error!(%err, "http transport failed");
            }
        })
    });

    info!("MCP switchboard ready");

    // ── Wait for shutdown ───────────────────────────────
    match (args.transport, stdio_handle) {
        // Stdio-only: the peer closing stdin ends the process.
        (TransportMode::Stdio, Some(mut handle)) => {
            tokio::select! {
                () = shutdown_signal() => info!("shutdown signal received"),
                _ = &mut handle => info!("stdio peer disconnected"),
            }
            state.shutdown.cancel();
            let _ = handle.await;
        }
        (_, stdio_handle) => {
            shutdown_signal().await;
            info!("shutdown signal received");
            state.shutdown.cancel();
            if let Some(handle) = stdio_handle {
                let _ = handle.await;
            }
        }
    }

    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    info!("mcp-switchboard shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs go to stderr so stdout stays reserved for the stdio transport.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
