//! Transport adapters.
//!
//! Duplex transports (WebSocket, stdio) share [`connection::Connection`]:
//! one read loop, one write lock, one correlator and one hub listener per
//! peer. Stateless HTTP and SSE live in [`http`] and [`sse`].

pub mod connection;
pub mod http;
pub mod sse;
pub mod stdio;
pub mod ws;

use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

pub use connection::{
    CallOptions, Connection, ConnectionDriver, ConnectionOptions, FrameSink, Services,
};

/// Unique identifier of one duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Transport a connection, listener or request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// WebSocket text frames.
    WebSocket,
    /// Newline-delimited JSON over a byte stream.
    Stdio,
    /// Server-sent events stream.
    Sse,
    /// Stateless HTTP POST.
    Http,
}

impl TransportKind {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
