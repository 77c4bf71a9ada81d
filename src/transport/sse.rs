//! Server-sent events stream for stateless clients.
//!
//! `GET /sse?subscribe=<uri>&subscribe=*` registers an `sse` listener,
//! applies the requested subscriptions and streams:
//!
//! 1. `event: endpoint` with the POST path bound to this listener
//!    (`/rpc?listener=<id>`), so later `resources/subscribe` calls reach it;
//! 2. `event: message` with one strict notification per frame.
//!
//! The listener is removed from the hub as soon as the client disconnects.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use futures_util::{future, StreamExt};
use tracing::{debug, info, info_span, Instrument};

use super::TransportKind;
use crate::hub::{ListenerId, NotificationHub};
use crate::server::AppState;

/// Handler for `GET /sse`.
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (listener, outbound) = state.hub.register_listener(TransportKind::Sse);
    for uri in subscribe_targets(&params) {
        state.hub.subscribe(listener, uri);
    }
    info!(
        listener_id = %listener,
        subscriptions = ?state.hub.subscriptions_of(listener),
        "SSE stream opened"
    );

    let guard = ListenerGuard {
        hub: Arc::clone(&state.hub),
        listener,
    };
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/rpc?listener={listener}"));

    let span = info_span!("sse", listener_id = %listener);
    let messages = stream::unfold((outbound, guard), move |(mut outbound, guard)| {
        async move {
            let frame = outbound.recv().await?;
            debug!("forwarding notification");
            let event = Event::default().event("message").data(&*frame);
            Some((Ok::<_, Infallible>(event), (outbound, guard)))
        }
        .instrument(span.clone())
    });

    let stream = stream::once(future::ready(Ok::<_, Infallible>(endpoint)))
        .chain(messages)
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.config.sse_keep_alive()))
}

/// Values of every non-empty `subscribe` query parameter, in order.
fn subscribe_targets(params: &[(String, String)]) -> impl Iterator<Item = &str> {
    params
        .iter()
        .filter(|(key, _)| key == "subscribe")
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

/// Removes the SSE listener when the response stream is dropped.
struct ListenerGuard {
    hub: Arc<NotificationHub>,
    listener: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.hub.remove_listener(self.listener) {
            debug!(listener_id = %self.listener, "SSE stream closed");
        }
    }
}
