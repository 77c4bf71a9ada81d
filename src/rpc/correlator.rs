//! Pending-call table for outbound requests on one connection.
//!
//! Each outbound request registers a [`PendingHandle`] keyed by its id.  The
//! connection's read loop hands inbound responses to [`Correlator::resolve`],
//! which removes the entry and completes the caller's `oneshot`.
//!
//! Resolution, deadline expiry and caller cancellation race each other; the
//! path that removes the table entry first wins and the others become no-ops.
//! Dropping a handle without waiting (caller future cancelled) removes its
//! entry, so the table never leaks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{ErrorInfo, RequestId, RpcResult};
use crate::transport::ConnectionId;

/// Deadline applied when the caller does not supply one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on in-flight calls per connection.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// One in-flight call awaiting its response.
struct PendingCall {
    tx: oneshot::Sender<RpcResult<Value>>,
    method: String,
}

/// Per-connection table of in-flight outbound calls.
pub struct Correlator {
    connection: ConnectionId,
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    default_timeout: Duration,
    max_pending: usize,
}

impl Correlator {
    /// Create a correlator owned by `connection` with default limits.
    #[must_use]
    pub fn new(connection: ConnectionId) -> Self {
        Self::with_limits(connection, DEFAULT_REQUEST_TIMEOUT, DEFAULT_MAX_PENDING)
    }

    /// Create a correlator with an explicit default deadline and table bound.
    #[must_use]
    pub fn with_limits(
        connection: ConnectionId,
        default_timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            connection,
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            default_timeout,
            max_pending,
        }
    }

    /// Connection that owns every call in this table.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Deadline used by [`Correlator::register`].
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Issue the next outbound request id.
    ///
    /// Ids start at 1 and increase monotonically for the lifetime of this
    /// correlator, independent of any other connection.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a pending call with the default deadline.
    ///
    /// # Errors
    ///
    /// See [`Correlator::register_with_timeout`].
    pub fn register(&self, id: RequestId, method: &str) -> RpcResult<PendingHandle<'_>> {
        self.register_with_timeout(id, method, self.default_timeout)
    }

    /// Register a pending call that expires after `timeout`.
    ///
    /// # Errors
    ///
    /// - `invalid_request` if a call with the same id is already pending.
    /// - `internal_error` if the table already holds the maximum number of calls.
    pub fn register_with_timeout(
        &self,
        id: RequestId,
        method: &str,
        timeout: Duration,
    ) -> RpcResult<PendingHandle<'_>> {
        let mut pending = self.table();

        if pending.contains_key(&id) {
            return Err(ErrorInfo::invalid_request(format!(
                "duplicate request id: {id}"
            )));
        }

        if pending.len() >= self.max_pending {
            warn!(
                connection_id = %self.connection,
                pending = pending.len(),
                max_pending = self.max_pending,
                "too many pending calls; refusing new call"
            );
            return Err(ErrorInfo::internal("too many pending calls"));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(
            id.clone(),
            PendingCall {
                tx,
                method: method.to_owned(),
            },
        );
        debug!(
            connection_id = %self.connection,
            request_id = %id,
            method,
            pending = pending.len(),
            "registered pending call"
        );

        Ok(PendingHandle {
            correlator: self,
            id,
            rx: Some(rx),
            deadline: Instant::now() + timeout,
            timeout,
            settled: false,
        })
    }

    /// Complete the pending call with `id`.
    ///
    /// Returns `false` when no such call is pending (already timed out,
    /// cancelled, or never issued here); the outcome is discarded.
    pub fn resolve(&self, id: &RequestId, outcome: RpcResult<Value>) -> bool {
        let entry = self.table().remove(id);
        if let Some(call) = entry {
            debug!(
                connection_id = %self.connection,
                request_id = %id,
                method = %call.method,
                "resolved pending call"
            );
            // Receiver may already be gone if the caller was dropped.
            let _ = call.tx.send(outcome);
            true
        } else {
            debug!(
                connection_id = %self.connection,
                request_id = %id,
                "no pending call for response; discarding"
            );
            false
        }
    }

    /// Fail every pending call with `reason`. Returns the number of calls cancelled.
    pub fn cancel_all(&self, reason: &ErrorInfo) -> usize {
        let drained: Vec<(RequestId, PendingCall)> = self.table().drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            debug!(
                connection_id = %self.connection,
                request_id = %id,
                method = %call.method,
                "cancelling pending call"
            );
            let _ = call.tx.send(Err(reason.clone()));
        }
        count
    }

    /// Number of calls currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Whether a call with `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.table().contains_key(id)
    }

    fn forget(&self, id: &RequestId) -> bool {
        self.table().remove(id).is_some()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why a wait ended without a response.
enum Expiry {
    Deadline,
    Cancelled,
}

/// Caller-side handle for one pending call.
///
/// Dropping the handle before it settles removes the call from the table.
pub struct PendingHandle<'a> {
    correlator: &'a Correlator,
    id: RequestId,
    rx: Option<oneshot::Receiver<RpcResult<Value>>>,
    deadline: Instant,
    timeout: Duration,
    settled: bool,
}

impl PendingHandle<'_> {
    /// Id of the pending call.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Instant at which the call times out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response or the deadline.
    ///
    /// # Errors
    ///
    /// Returns the peer's error, `timeout` on deadline expiry, or
    /// `connection_closed` if the connection went away.
    pub async fn wait(self) -> RpcResult<Value> {
        self.wait_with_cancel(None).await
    }

    /// Wait for the response, the deadline, or `cancel`, whichever comes first.
    ///
    /// # Errors
    ///
    /// As [`PendingHandle::wait`], plus `internal_error` when `cancel` fires.
    pub async fn wait_with_cancel(
        mut self,
        cancel: Option<&CancellationToken>,
    ) -> RpcResult<Value> {
        let Some(mut rx) = self.rx.take() else {
            return Err(ErrorInfo::internal("pending call already awaited"));
        };

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let expiry = tokio::select! {
            biased;

            outcome = &mut rx => {
                self.settled = true;
                return outcome.unwrap_or_else(|_| Err(dropped_sender()));
            }

            () = tokio::time::sleep_until(self.deadline) => Expiry::Deadline,

            () = cancelled => Expiry::Cancelled,
        };

        self.settled = true;
        if self.correlator.forget(&self.id) {
            debug!(
                connection_id = %self.correlator.connection,
                request_id = %self.id,
                "pending call expired"
            );
            Err(match expiry {
                Expiry::Deadline => ErrorInfo::timeout(format!(
                    "request {} timed out after {}ms",
                    self.id,
                    self.timeout.as_millis()
                )),
                Expiry::Cancelled => {
                    ErrorInfo::internal(format!("request {} cancelled by caller", self.id))
                }
            })
        } else {
            // A resolution removed the entry first; its outcome is in flight.
            rx.await.unwrap_or_else(|_| Err(dropped_sender()))
        }
    }
}

impl Drop for PendingHandle<'_> {
    fn drop(&mut self) {
        if !self.settled && self.correlator.forget(&self.id) {
            debug!(
                connection_id = %self.correlator.connection,
                request_id = %self.id,
                "pending call abandoned by caller"
            );
        }
    }
}

fn dropped_sender() -> ErrorInfo {
    ErrorInfo::connection_closed("pending call dropped before a response arrived")
}
