//! Duplex connection shared by the WebSocket and stdio transports.
//!
//! A [`Connection`] owns everything tied to one peer: its [`Correlator`], its
//! hub listener, a write mutex over the outbound frame sink, and a
//! [`TaskTracker`] for per-request handler tasks. [`ConnectionDriver::run`]
//! drives the read loop and performs teardown when it ends.
//!
//! # Read loop
//!
//! | Frame                         | Action                                    |
//! |-------------------------------|-------------------------------------------|
//! | undecodable / over-long       | logged at `WARN`, skipped                 |
//! | Request                       | dispatched on a tracked task              |
//! | Response                      | resolves this connection's correlator     |
//! | Notification (hub event)      | published on the hub                      |
//! | Notification (other)          | dispatcher notification handler           |
//! | transport error / end of stream | teardown                                |
//!
//! # Teardown order
//!
//! 1. mark closed (cancels in-flight writes and handler tasks)
//! 2. fail every pending call with `connection_closed`
//! 3. remove the hub listener
//! 4. await the request, notification and flush tasks
//! 5. close the sink

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{ConnectionId, TransportKind};
use crate::config::GlobalConfig;
use crate::hub::{HubEvent, ListenerId, NotificationHub, Outbound};
use crate::protocol::codec::{self, DecodeOptions, Inbound};
use crate::protocol::framing::MAX_LINE_BYTES;
use crate::protocol::{Dialect, Envelope, ErrorInfo, Notification, Request, Response, RpcResult};
use crate::rpc::{
    Correlator, Dispatcher, RequestContext, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT,
};
use crate::{AppError, Result};

/// Outbound half of a transport: accepts one encoded frame per item.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = AppError> + Send>>;

/// Upper bound on flushing and closing the sink during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Bytes of an undecodable frame included in its warning.
const LOGGED_FRAME_BYTES: usize = 256;

/// Per-connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Deadline for outbound requests without their own.
    pub request_timeout: Duration,
    /// Bound on in-flight outbound requests.
    pub max_pending_calls: usize,
    /// Line limit for newline-delimited transports.
    pub max_line_bytes: usize,
    /// Dialects accepted on inbound frames.
    pub decode: DecodeOptions,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending_calls: DEFAULT_MAX_PENDING,
            max_line_bytes: MAX_LINE_BYTES,
            decode: DecodeOptions::default(),
        }
    }
}

impl ConnectionOptions {
    /// Derive connection settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_pending_calls: config.rpc.max_pending_calls,
            max_line_bytes: config.protocol.max_line_bytes,
            decode: DecodeOptions {
                accept_legacy: cfg!(feature = "legacy-dialect") && config.protocol.legacy_dialect,
            },
        }
    }
}

/// Process-wide services every connection routes into.
#[derive(Clone)]
pub struct Services {
    /// Inbound request and notification handlers.
    pub dispatcher: Arc<Dispatcher>,
    /// Notification fan-out.
    pub hub: Arc<NotificationHub>,
    /// Parent of every connection's close token.
    pub shutdown: CancellationToken,
}

impl Services {
    /// Bundle `dispatcher` and `hub` under a fresh shutdown token.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, hub: Arc<NotificationHub>) -> Self {
        Self {
            dispatcher,
            hub,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Per-call options for [`Connection::request_with`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the connection's default deadline.
    pub timeout: Option<Duration>,
    /// Abandons the call when fired.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Options with an explicit deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }
}

/// One live duplex peer.
pub struct Connection {
    id: ConnectionId,
    kind: TransportKind,
    correlator: Correlator,
    writer: Mutex<FrameSink>,
    services: Services,
    listener: ListenerId,
    options: ConnectionOptions,
    closed: CancellationToken,
    tasks: TaskTracker,
}

/// Drives one [`Connection`]'s read loop; consumed by [`ConnectionDriver::run`].
pub struct ConnectionDriver {
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Outbound>,
}

// ── Public API ────────────────────────────────────────────────────────────────

impl Connection {
    /// Create a connection over `sink` and register its hub listener.
    ///
    /// Nothing is read until the returned driver runs.
    #[must_use]
    pub fn new(
        kind: TransportKind,
        sink: FrameSink,
        services: Services,
        options: ConnectionOptions,
    ) -> (Arc<Self>, ConnectionDriver) {
        let id = ConnectionId::new();
        let (listener, outbound) = services.hub.register_listener(kind);
        let connection = Arc::new(Self {
            id,
            kind,
            correlator: Correlator::with_limits(
                id,
                options.request_timeout,
                options.max_pending_calls,
            ),
            writer: Mutex::new(sink),
            closed: services.shutdown.child_token(),
            services,
            listener,
            options,
            tasks: TaskTracker::new(),
        });
        info!(connection_id = %id, transport = %kind, listener_id = %listener, "connection opened");

        let driver = ConnectionDriver {
            connection: Arc::clone(&connection),
            outbound,
        };
        (connection, driver)
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Transport this connection runs over.
    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.kind
    }

    /// Hub listener owned by this connection.
    #[must_use]
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Number of outbound calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.correlator.len()
    }

    /// Whether close has been requested or teardown has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Request close. The driver tears the connection down asynchronously.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(connection_id = %self.id, "close requested");
        }
        self.closed.cancel();
    }

    /// Resolve once close has been requested.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Send a request to the peer and wait for its response.
    ///
    /// # Errors
    ///
    /// See [`Connection::request_with`].
    pub async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        self.request_with(method, params, CallOptions::default()).await
    }

    /// Send a request with per-call deadline and cancellation.
    ///
    /// # Errors
    ///
    /// - the peer's error response, decoded.
    /// - `timeout` when no response arrives before the deadline.
    /// - `connection_closed` when the connection is or becomes closed.
    /// - `internal_error` when the pending table is full or `cancel` fires.
    pub async fn request_with(
        &self,
        method: &str,
        params: Value,
        options: CallOptions,
    ) -> RpcResult<Value> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let id = self.correlator.next_id();
        let timeout = options.timeout.unwrap_or(self.options.request_timeout);
        let handle = self.correlator.register_with_timeout(id.clone(), method, timeout)?;

        // Teardown may have drained the table between the check above and registration.
        if self.is_closed() {
            return Err(closed_error());
        }

        let request = Envelope::Request(Request {
            id,
            method: method.to_owned(),
            params,
        });
        if let Err(err) = self.write(&request, Dialect::Strict).await {
            warn!(connection_id = %self.id, method, error = %err, "failed to send request");
            return Err(ErrorInfo::connection_closed(format!("failed to send request: {err}")));
        }

        handle.wait_with_cancel(options.cancel.as_ref()).await
    }

    /// Send a one-way notification to the peer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the connection is closed or the write fails.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let notification = Envelope::Notification(Notification {
            method: method.to_owned(),
            params,
        });
        self.write(&notification, Dialect::Strict).await
    }

    fn context(&self) -> RequestContext {
        RequestContext {
            connection: Some(self.id),
            transport: self.kind,
            listener: Some(self.listener),
        }
    }

    async fn write(&self, envelope: &Envelope, dialect: Dialect) -> Result<()> {
        self.write_frame(codec::encode(envelope, dialect)).await
    }

    /// Write one frame under the connection's write lock.
    ///
    /// Aborts as soon as the connection is closed, so a stalled peer cannot
    /// hold the lock through teardown.
    async fn write_frame(&self, frame: String) -> Result<()> {
        tokio::select! {
            biased;

            () = self.closed.cancelled() => {
                Err(AppError::Transport("connection closed".into()))
            }

            result = async {
                let mut writer = self.writer.lock().await;
                let sink: &mut FrameSink = &mut writer;
                sink.send(frame).await
            } => result,
        }
    }
}

impl ConnectionDriver {
    /// The connection this driver runs.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Run the read loop over `frames` until end of stream, a fatal transport
    /// error, or close; then tear the connection down.
    pub async fn run<S>(self, frames: S)
    where
        S: Stream<Item = Result<String>> + Send,
    {
        let Self { connection, outbound } = self;
        let span = info_span!(
            "connection",
            connection_id = %connection.id,
            transport = %connection.kind,
        );

        async move {
            connection
                .tasks
                .spawn(flush_outbound(Arc::clone(&connection), outbound).in_current_span());
            read_loop(&connection, frames).await;
            teardown(&connection).await;
        }
        .instrument(span)
        .await;
    }

    /// Spawn [`ConnectionDriver::run`] on the runtime.
    pub fn spawn<S>(self, frames: S) -> JoinHandle<()>
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        tokio::spawn(self.run(frames))
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

async fn read_loop<S>(connection: &Arc<Connection>, frames: S)
where
    S: Stream<Item = Result<String>>,
{
    let mut frames = std::pin::pin!(frames);

    loop {
        tokio::select! {
            biased;

            () = connection.closed.cancelled() => {
                debug!("close requested, stopping read loop");
                break;
            }

            item = frames.next() => {
                match item {
                    None => {
                        info!("peer closed the stream");
                        break;
                    }

                    Some(Err(err)) if err.is_recoverable() => {
                        warn!(error = %err, "malformed frame, skipping");
                    }

                    Some(Err(err)) => {
                        warn!(error = %err, "transport read failed, closing connection");
                        break;
                    }

                    Some(Ok(frame)) => handle_frame(connection, &frame),
                }
            }
        }
    }
}

fn handle_frame(connection: &Arc<Connection>, frame: &str) {
    if frame.trim().is_empty() {
        return;
    }

    let Inbound { envelope, dialect } = match codec::decode(frame, connection.options.decode) {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!(
                error = %err,
                frame_len = frame.len(),
                frame_head = %frame_head(frame),
                "undecodable frame, skipping"
            );
            return;
        }
    };

    match envelope {
        Envelope::Request(request) => spawn_request(connection, request, dialect),
        Envelope::Response(Response { id, outcome }) => {
            connection.correlator.resolve(&id, outcome);
        }
        Envelope::Notification(notification) => route_notification(connection, notification),
    }
}

fn spawn_request(connection: &Arc<Connection>, request: Request, dialect: Dialect) {
    let conn = Arc::clone(connection);
    debug!(method = %request.method, request_id = %request.id, "dispatching request");

    connection.tasks.spawn(
        async move {
            let dispatcher = Arc::clone(&conn.services.dispatcher);
            let method = request.method.clone();

            tokio::select! {
                biased;

                () = conn.closed.cancelled() => {
                    debug!(method = %method, "connection closed before handler finished");
                }

                response = dispatcher.dispatch(request, conn.context()) => {
                    if let Err(err) = conn.write(&Envelope::Response(response), dialect).await {
                        warn!(method = %method, error = %err, "failed to write response");
                    }
                }
            }
        }
        .in_current_span(),
    );
}

fn route_notification(connection: &Arc<Connection>, notification: Notification) {
    if let Some(event) = HubEvent::from_notification(&notification) {
        let report = connection
            .services
            .hub
            .publish_excluding(&event, Some(connection.listener));
        debug!(
            method = %notification.method,
            delivered = report.delivered,
            dropped = report.dropped,
            "relayed hub event from peer"
        );
        return;
    }

    let conn = Arc::clone(connection);
    connection.tasks.spawn(
        async move {
            let dispatcher = Arc::clone(&conn.services.dispatcher);
            let method = notification.method.clone();

            tokio::select! {
                biased;

                () = conn.closed.cancelled() => {
                    debug!(method = %method, "connection closed before notification handled");
                }

                _ = dispatcher.notify(notification, conn.context()) => {}
            }
        }
        .in_current_span(),
    );
}

/// Move queued hub notifications onto the wire.
async fn flush_outbound(connection: Arc<Connection>, mut outbound: mpsc::Receiver<Outbound>) {
    loop {
        tokio::select! {
            biased;

            () = connection.closed.cancelled() => break,

            next = outbound.recv() => {
                let Some(frame) = next else {
                    break;
                };
                if let Err(err) = connection.write_frame(frame.to_string()).await {
                    warn!(error = %err, "failed to flush notification");
                    break;
                }
            }
        }
    }
}

async fn teardown(connection: &Arc<Connection>) {
    connection.closed.cancel();

    let cancelled = connection
        .correlator
        .cancel_all(&ErrorInfo::connection_closed("connection closed"));
    let listener_removed = connection.services.hub.remove_listener(connection.listener);

    connection.tasks.close();
    connection.tasks.wait().await;

    let mut writer = connection.writer.lock().await;
    let sink: &mut FrameSink = &mut writer;
    match tokio::time::timeout(CLOSE_GRACE, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "error closing sink"),
        Err(_) => debug!("timed out closing sink"),
    }

    info!(cancelled_calls = cancelled, listener_removed, "connection closed");
}

/// Leading slice of `frame` for logs, cut on a char boundary.
fn frame_head(frame: &str) -> &str {
    if frame.len() <= LOGGED_FRAME_BYTES {
        return frame;
    }
    let mut end = LOGGED_FRAME_BYTES;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}

fn closed_error() -> ErrorInfo {
    ErrorInfo::connection_closed("connection is closed")
}
