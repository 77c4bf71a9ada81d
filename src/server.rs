//! Shared application state and the HTTP router.
//!
//! One axum router serves every network transport:
//!
//! | Route               | Transport                                |
//! |---------------------|------------------------------------------|
//! | `GET /health`       | liveness check, returns `ok`             |
//! | `GET /ws`           | WebSocket upgrade, one duplex connection |
//! | `GET /sse`          | server-sent notification stream          |
//! | `POST /rpc`         | one envelope per request                 |
//! | `POST /rpc/{*method}` | params body, method from the path      |

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::hub::NotificationHub;
use crate::mcp::model::ServerInfo;
use crate::mcp::{methods, Catalog};
use crate::protocol::DecodeOptions;
use crate::rpc::Dispatcher;
use crate::transport::{http, sse, ws, ConnectionOptions, Services};
use crate::{AppError, Result};

/// State shared by every transport.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Method table.
    pub dispatcher: Arc<Dispatcher>,
    /// Notification fan-out.
    pub hub: Arc<NotificationHub>,
    /// Tools, prompts and resources.
    pub catalog: Arc<Catalog>,
    /// Fires once to stop every transport and connection.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with the MCP method surface installed and an empty catalog.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        Self::with_methods(config, |_| {})
    }

    /// As [`AppState::new`], letting `extend` register extra methods before
    /// the dispatcher is frozen.
    #[must_use]
    pub fn with_methods(config: GlobalConfig, extend: impl FnOnce(&mut Dispatcher)) -> Self {
        let hub = Arc::new(NotificationHub::new(config.notifications.listener_capacity));
        let catalog = Arc::new(Catalog::new(Arc::clone(&hub)));

        let mut dispatcher = Dispatcher::new();
        methods::install(
            &mut dispatcher,
            &catalog,
            &hub,
            ServerInfo {
                name: config.server.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        );
        extend(&mut dispatcher);

        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            hub,
            catalog,
            shutdown: CancellationToken::new(),
        }
    }

    /// Services handed to each duplex connection.
    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            dispatcher: Arc::clone(&self.dispatcher),
            hub: Arc::clone(&self.hub),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Per-connection settings derived from the configuration.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::from_config(&self.config)
    }

    /// Dialects accepted on inbound frames.
    #[must_use]
    pub fn decode_options(&self) -> DecodeOptions {
        self.connection_options().decode
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Router serving every HTTP-based transport.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route("/sse", get(sse::sse_handler))
        .route("/rpc", post(http::rpc_handler))
        .route("/rpc/{*method}", post(http::method_handler))
        .with_state(state)
}

/// Bind `server.bind_address:server.http_port` and serve until shutdown.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound,
/// or `AppError::Transport` if the server fails.
pub async fn serve_http(state: Arc<AppState>) -> Result<()> {
    let bind = state.config.http_addr()?;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_listener(listener, state).await
}

/// Serve on an already-bound listener until shutdown.
///
/// # Errors
///
/// Returns `AppError::Transport` if the server fails.
pub async fn serve_listener(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Transport(format!("listener has no local address: {err}")))?;
    let shutdown = state.shutdown.clone();

    info!(%local, "starting HTTP transport (ws, sse, rpc)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::Transport(format!("HTTP server error: {err}")))?;

    info!("HTTP transport shut down");
    Ok(())
}
