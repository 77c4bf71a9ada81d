//! Global configuration parsing and validation.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Listener identity and HTTP binding.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ServerConfig {
    /// Name reported in the `initialize` result.
    pub name: String,
    /// Interface the HTTP/WebSocket/SSE listener binds to.
    pub bind_address: String,
    /// HTTP port for the WebSocket, SSE and stateless RPC endpoints.
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "mcp-switchboard".into(),
            bind_address: "127.0.0.1".into(),
            http_port: 3000,
        }
    }
}

/// Request/response correlation settings for duplex transports.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RpcConfig {
    /// Deadline applied to outbound requests that do not supply their own.
    pub request_timeout_seconds: u64,
    /// Upper bound on in-flight outbound requests per connection.
    pub max_pending_calls: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
            max_pending_calls: 1024,
        }
    }
}

/// Notification fan-out settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct NotificationConfig {
    /// Bounded outbound queue length per listener; deliveries beyond it are dropped.
    pub listener_capacity: usize,
    /// Idle interval between SSE keep-alive comments.
    pub sse_keep_alive_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            listener_capacity: 64,
            sse_keep_alive_seconds: 15,
        }
    }
}

/// Wire-format settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ProtocolConfig {
    /// Accept the legacy `type`/`messageId` dialect when strict parsing fails.
    ///
    /// Has no effect when the crate is built without the `legacy-dialect` feature.
    pub legacy_dialect: bool,
    /// Maximum length of one newline-delimited frame on stdio.
    pub max_line_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            legacy_dialect: true,
            max_line_bytes: crate::protocol::framing::MAX_LINE_BYTES,
        }
    }
}

/// Global configuration parsed from `config.toml`.
///
/// Every section is optional; an empty document yields [`GlobalConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Listener identity and HTTP binding.
    pub server: ServerConfig,
    /// Correlation settings.
    pub rpc: RpcConfig,
    /// Notification fan-out settings.
    pub notifications: NotificationConfig,
    /// Wire-format settings.
    pub protocol: ProtocolConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address the HTTP listener binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `bind_address` is not an IP address.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.server.bind_address.parse().map_err(|err| {
            AppError::Config(format!(
                "invalid bind_address '{}': {err}",
                self.server.bind_address
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.http_port))
    }

    /// Default deadline for outbound duplex requests.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.request_timeout_seconds)
    }

    /// Interval between SSE keep-alive frames.
    #[must_use]
    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.notifications.sse_keep_alive_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "rpc.request_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.rpc.max_pending_calls == 0 {
            return Err(AppError::Config(
                "rpc.max_pending_calls must be greater than zero".into(),
            ));
        }

        if self.notifications.listener_capacity == 0 {
            return Err(AppError::Config(
                "notifications.listener_capacity must be greater than zero".into(),
            ));
        }

        if self.notifications.sse_keep_alive_seconds == 0 {
            return Err(AppError::Config(
                "notifications.sse_keep_alive_seconds must be greater than zero".into(),
            ));
        }

        if self.protocol.max_line_bytes == 0 {
            return Err(AppError::Config(
                "protocol.max_line_bytes must be greater than zero".into(),
            ));
        }

        self.http_addr()?;
        Ok(())
    }
}
