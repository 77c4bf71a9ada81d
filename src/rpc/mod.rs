//! Request correlation and method dispatch.

pub mod correlator;
pub mod dispatcher;

pub use correlator::{Correlator, PendingHandle, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT};
pub use dispatcher::{Dispatcher, RequestContext};
