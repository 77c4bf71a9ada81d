//! Envelope model shared by both wire dialects.
//!
//! An [`Envelope`] is one wire message: a [`Request`], a [`Response`] or a
//! [`Notification`]. The model is dialect-neutral; [`codec`](super::codec)
//! decides how it is laid out on the wire.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation identifier carried by requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id, as issued by [`Correlator::next_id`](crate::rpc::Correlator::next_id).
    Number(i64),
    /// String id, common in the legacy dialect (`messageId`).
    String(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Error taxonomy shared by handlers, the dispatcher and the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request or unknown method.
    InvalidRequest,
    /// Parameters failed validation.
    InvalidParams,
    /// Named prompt, tool or resource does not exist.
    NotFound,
    /// Catch-all handler or runtime failure.
    Internal,
    /// No response arrived before the call deadline.
    Timeout,
    /// The owning connection closed before a response arrived.
    ConnectionClosed,
}

impl ErrorKind {
    /// Numeric protocol code for this kind.
    ///
    /// Only `not_found`, `invalid_request` and `invalid_params` have dedicated
    /// codes; everything else is reported as `-32603`.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::NotFound => -32002,
            Self::InvalidRequest => -32600,
            Self::InvalidParams => -32602,
            Self::Internal | Self::Timeout | Self::ConnectionClosed => -32603,
        }
    }

    /// Recover a kind from a numeric protocol code.
    ///
    /// `-32601` (method not found) and `-32700` (parse error) from foreign
    /// JSON-RPC peers fold into [`ErrorKind::InvalidRequest`].
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            -32002 => Self::NotFound,
            -32600 | -32601 | -32700 => Self::InvalidRequest,
            -32602 => Self::InvalidParams,
            _ => Self::Internal,
        }
    }

    /// Snake-case taxonomy tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidParams => "invalid_params",
            Self::NotFound => "not_found",
            Self::Internal => "internal_error",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
        }
    }

    /// Parse a taxonomy tag; unrecognized tags map to [`ErrorKind::Internal`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "invalid_request" => Self::InvalidRequest,
            "invalid_params" => Self::InvalidParams,
            "not_found" => Self::NotFound,
            "timeout" => Self::Timeout,
            "connection_closed" => Self::ConnectionClosed,
            _ => Self::Internal,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Protocol error returned to a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    /// Taxonomy tag.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
}

impl ErrorInfo {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `invalid_request` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// `invalid_params` error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// `not_found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// `internal_error` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// `timeout` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// `connection_closed` error.
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionClosed, message)
    }

    /// Numeric wire code.
    #[must_use]
    pub fn code(&self) -> i64 {
        self.kind.code()
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Result type for anything that ends up in a [`Response`].
pub type RpcResult<T> = std::result::Result<T, ErrorInfo>;

/// A call expecting exactly one [`Response`] with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters; `Null` when absent.
    pub params: Value,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered. Never absent.
    pub id: RequestId,
    /// Result value or error.
    pub outcome: RpcResult<Value>,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: RequestId, error: ErrorInfo) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// A one-way message; never carries an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name, e.g. `notifications/resources/updated`.
    pub method: String,
    /// Method parameters; `Null` when absent.
    pub params: Value,
}

/// One wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Call expecting a response.
    Request(Request),
    /// Answer to a call.
    Response(Response),
    /// One-way message.
    Notification(Notification),
}

impl Envelope {
    /// Short name of the envelope kind, for logging.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Notification(_) => "notification",
        }
    }
}

/// Wire dialect an envelope was received in (and is answered in).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// JSON-RPC 2.0.
    #[default]
    Strict,
    /// Pre-JSON-RPC `type`/`messageId`/`success` format.
    Legacy,
}
