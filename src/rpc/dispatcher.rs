//! Method table routing inbound requests and notifications to handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::hub::ListenerId;
use crate::protocol::{ErrorInfo, Notification, Request, Response, RpcResult};
use crate::transport::{ConnectionId, TransportKind};

/// Caller information handed to every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Duplex connection the request arrived on; `None` for stateless HTTP.
    pub connection: Option<ConnectionId>,
    /// Transport the request arrived on.
    pub transport: TransportKind,
    /// Hub listener that receives notifications for this caller, if any.
    pub listener: Option<ListenerId>,
}

impl RequestContext {
    /// Context for a stateless HTTP call, optionally tied to an SSE listener.
    #[must_use]
    pub fn stateless(listener: Option<ListenerId>) -> Self {
        Self {
            connection: None,
            transport: TransportKind::Http,
            listener,
        }
    }
}

type MethodHandler =
    Arc<dyn Fn(Value, RequestContext) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;
type NotificationHandler =
    Arc<dyn Fn(Value, RequestContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Method name to handler table.
///
/// Built once at startup, then shared behind an `Arc` by every transport.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, MethodHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl Dispatcher {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler over raw JSON params. Replaces any previous handler
    /// for `method`.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Value>> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |params, ctx| Box::pin(handler(params, ctx)));
        self.methods.insert(method.into(), handler);
    }

    /// Register a handler over typed params and result.
    ///
    /// Params that fail to deserialize into `P` are answered with
    /// `invalid_params` without invoking the handler. Absent params are
    /// treated as an empty object.
    pub fn register_typed<P, R, F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(method, move |params: Value, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let params = if params.is_null() {
                    Value::Object(Map::new())
                } else {
                    params
                };
                let typed: P = serde_json::from_value(params)
                    .map_err(|err| ErrorInfo::invalid_params(format!("invalid params: {err}")))?;
                let result = handler(typed, ctx).await?;
                serde_json::to_value(result).map_err(|err| {
                    ErrorInfo::internal(format!("failed to serialize result: {err}"))
                })
            }
        });
    }

    /// Register a notification handler. Replaces any previous handler for
    /// `method`.
    pub fn register_notification<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationHandler =
            Arc::new(move |params, ctx| Box::pin(handler(params, ctx)));
        self.notifications.insert(method.into(), handler);
    }

    /// Whether a request handler exists for `method`.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Registered request methods, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler for `request` and build its response.
    ///
    /// Unknown methods yield `invalid_request` ("method not found"). The
    /// response always carries the request's id.
    pub async fn dispatch(&self, request: Request, ctx: RequestContext) -> Response {
        let Request { id, method, params } = request;

        let Some(handler) = self.methods.get(&method) else {
            warn!(method = %method, request_id = %id, "no handler for method");
            return Response::failure(
                id,
                ErrorInfo::invalid_request(format!("method not found: {method}")),
            );
        };

        let outcome = handler(params, ctx).await;
        if let Err(err) = &outcome {
            debug!(method = %method, request_id = %id, error = %err, "handler returned error");
        }
        Response { id, outcome }
    }

    /// Run the handler for `notification`.
    ///
    /// Returns `false` if no handler is registered; the notification is
    /// dropped without a reply either way.
    pub async fn notify(&self, notification: Notification, ctx: RequestContext) -> bool {
        let Notification { method, params } = notification;
        match self.notifications.get(&method) {
            Some(handler) => {
                handler(params, ctx).await;
                true
            }
            None => {
                debug!(method = %method, "no handler for notification; ignoring");
                false
            }
        }
    }
}
