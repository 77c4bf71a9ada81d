//! Stateless request/response over HTTP POST.
//!
//! | Route                 | Body                    | Reply                          |
//! |-----------------------|-------------------------|--------------------------------|
//! | `POST /rpc`           | one envelope, any dialect | Response in the same dialect; `202` for notifications |
//! | `POST /rpc/{*method}` | the `params` object     | strict Response, generated id  |
//!
//! Both routes accept `?listener=<id>` to bind the call to an SSE listener,
//! which `resources/subscribe` needs when there is no duplex connection.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::hub::{HubEvent, ListenerId};
use crate::protocol::codec::{self, Inbound};
use crate::protocol::{Dialect, Envelope, ErrorInfo, Request, RequestId};
use crate::rpc::RequestContext;
use crate::server::AppState;

/// Query parameters shared by both routes.
#[derive(Debug, Default, Deserialize)]
pub struct RpcQuery {
    /// SSE listener to bind the call to.
    pub listener: Option<u64>,
}

/// Handler for `POST /rpc`.
pub async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RpcQuery>,
    body: String,
) -> Response {
    let ctx = match bind_listener(&state, query.listener) {
        Ok(ctx) => ctx,
        Err(err) => return error_reply(StatusCode::NOT_FOUND, &err),
    };

    let Inbound { envelope, dialect } = match codec::decode(&body, state.decode_options()) {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!(error = %err, "rejecting undecodable rpc body");
            return error_reply(
                StatusCode::BAD_REQUEST,
                &ErrorInfo::invalid_request(err.to_string()),
            );
        }
    };

    match envelope {
        Envelope::Request(request) => {
            let span = info_span!("rpc", method = %request.method, request_id = %request.id);
            debug!(parent: &span, "stateless request");
            let response = state.dispatcher.dispatch(request, ctx).instrument(span).await;
            Json(codec::to_value(&Envelope::Response(response), dialect)).into_response()
        }
        Envelope::Notification(notification) => {
            if let Some(event) = HubEvent::from_notification(&notification) {
                state.hub.publish(&event);
            } else {
                state.dispatcher.notify(notification, ctx).await;
            }
            StatusCode::ACCEPTED.into_response()
        }
        Envelope::Response(response) => {
            debug!(request_id = %response.id, "response posted to stateless endpoint");
            error_reply(
                StatusCode::BAD_REQUEST,
                &ErrorInfo::invalid_request("responses are not accepted on this endpoint"),
            )
        }
    }
}

/// Handler for `POST /rpc/{*method}`.
pub async fn method_handler(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    Query(query): Query<RpcQuery>,
    body: String,
) -> Response {
    let ctx = match bind_listener(&state, query.listener) {
        Ok(ctx) => ctx,
        Err(err) => return error_reply(StatusCode::NOT_FOUND, &err),
    };

    let params = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(&body) {
            Ok(params) => params,
            Err(err) => {
                warn!(method = %method, error = %err, "rejecting malformed params body");
                return error_reply(
                    StatusCode::BAD_REQUEST,
                    &ErrorInfo::invalid_params(format!("malformed json: {err}")),
                );
            }
        }
    };

    let request = Request {
        id: RequestId::String(Uuid::new_v4().to_string()),
        method,
        params,
    };
    let response = state.dispatcher.dispatch(request, ctx).await;
    Json(codec::to_value(&Envelope::Response(response), Dialect::Strict)).into_response()
}

fn bind_listener(state: &AppState, listener: Option<u64>) -> Result<RequestContext, ErrorInfo> {
    let listener = listener.map(ListenerId::from);
    if let Some(id) = listener {
        if !state.hub.contains(id) {
            return Err(ErrorInfo::not_found(format!("unknown listener: {id}")));
        }
    }
    Ok(RequestContext::stateless(listener))
}

/// Strict error envelope with a null id, for failures before an id is known.
fn error_reply(status: StatusCode, error: &ErrorInfo) -> Response {
    let body = json!({
        "jsonrpc": codec::JSONRPC_VERSION,
        "id": null,
        "error": codec::error_to_value(error),
    });
    (status, Json(body)).into_response()
}
