#![forbid(unsafe_code)]

//! Transport-neutral MCP runtime: one envelope model, two wire dialects,
//! request correlation, and subscription-based notification fan-out over
//! WebSocket, stdio and HTTP/SSE.

pub mod config;
pub mod errors;
pub mod hub;
pub mod mcp;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
