//! MCP semantics layered on the transport-neutral runtime.

pub mod builtin;
pub mod catalog;
pub mod methods;
pub mod model;

pub use catalog::Catalog;
