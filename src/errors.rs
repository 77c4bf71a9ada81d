//! Error types shared across the application.
//!
//! [`AppError`] covers local failures (configuration, framing, transport I/O).
//! Protocol-level failures that travel to a remote caller are modelled by
//! [`ErrorInfo`](crate::protocol::ErrorInfo) instead.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all local failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A single inbound frame could not be framed or parsed.
    ///
    /// Recoverable: the read loop logs it and continues.
    Codec(String),
    /// A decoded JSON value is not a valid envelope in any enabled dialect.
    ///
    /// Recoverable, like [`AppError::Codec`].
    Protocol(String),
    /// The underlying connection failed or was closed.
    ///
    /// Fatal for the affected connection.
    Transport(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the error only affects a single frame and the read loop may
    /// continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(_) | Self::Protocol(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("malformed json: {err}"))
    }
}
