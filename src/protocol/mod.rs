//! Wire protocol: envelope model, dialect codec and line framing.

pub mod codec;
pub mod envelope;
pub mod framing;
pub(crate) mod legacy;

pub use codec::{decode, encode, DecodeOptions, Inbound};
pub use envelope::{
    Dialect, Envelope, ErrorInfo, ErrorKind, Notification, Request, RequestId, Response,
    RpcResult,
};
