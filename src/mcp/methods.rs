//! MCP method surface registered on the dispatcher.
//!
//! | Method                  | Params                 | Result                  |
//! |-------------------------|------------------------|-------------------------|
//! | `initialize`            | any                    | [`InitializeResult`]    |
//! | `ping`                  | none                   | `{}`                    |
//! | `tools/list`            | none                   | [`ListToolsResult`]     |
//! | `tools/call`            | [`CallToolParams`]     | `CallToolResult`        |
//! | `prompts/list`          | none                   | [`ListPromptsResult`]   |
//! | `prompts/get`           | [`GetPromptParams`]    | `GetPromptResult`       |
//! | `resources/list`        | none                   | [`ListResourcesResult`] |
//! | `resources/read`        | [`ReadResourceParams`] | `ReadResourceResult`    |
//! | `resources/subscribe`   | [`SubscribeParams`]    | `{}`                    |
//! | `resources/unsubscribe` | [`SubscribeParams`]    | `{}`                    |
//!
//! Subscriptions attach to the caller's hub listener, so they need a duplex
//! connection or an HTTP call bound to an SSE stream.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::catalog::Catalog;
use super::model::{
    CallToolParams, GetPromptParams, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceParams, ServerInfo, SubscribeParams,
};
use crate::hub::{ListenerId, NotificationHub};
use crate::protocol::{ErrorInfo, RpcResult};
use crate::rpc::{Dispatcher, RequestContext};

/// Protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Register every MCP method on `dispatcher`.
pub fn install(
    dispatcher: &mut Dispatcher,
    catalog: &Arc<Catalog>,
    hub: &Arc<NotificationHub>,
    info: ServerInfo,
) {
    dispatcher.register("initialize", move |_params, ctx: RequestContext| {
        let result = initialize_result(&info);
        async move {
            info!(transport = %ctx.transport, "client initializing");
            Ok::<_, ErrorInfo>(result)
        }
    });

    dispatcher.register("ping", |_params, _ctx| async { Ok::<_, ErrorInfo>(json!({})) });

    let tools = Arc::clone(catalog);
    dispatcher.register("tools/list", move |_params, _ctx| {
        let result = ListToolsResult { tools: tools.tools() };
        async move { to_result(&result) }
    });

    let tools = Arc::clone(catalog);
    dispatcher.register_typed("tools/call", move |params: CallToolParams, _ctx| {
        let tools = Arc::clone(&tools);
        async move { tools.call_tool(&params.name, params.arguments).await }
    });

    let prompts = Arc::clone(catalog);
    dispatcher.register("prompts/list", move |_params, _ctx| {
        let result = ListPromptsResult {
            prompts: prompts.prompts(),
        };
        async move { to_result(&result) }
    });

    let prompts = Arc::clone(catalog);
    dispatcher.register_typed("prompts/get", move |params: GetPromptParams, _ctx| {
        let prompts = Arc::clone(&prompts);
        async move { prompts.get_prompt(&params.name, params.arguments).await }
    });

    let resources = Arc::clone(catalog);
    dispatcher.register("resources/list", move |_params, _ctx| {
        let result = ListResourcesResult {
            resources: resources.resources(),
        };
        async move { to_result(&result) }
    });

    let resources = Arc::clone(catalog);
    dispatcher.register_typed("resources/read", move |params: ReadResourceParams, _ctx| {
        let resources = Arc::clone(&resources);
        async move { resources.read_resource(&params.uri).await }
    });

    let subscriptions = Arc::clone(hub);
    dispatcher.register_typed(
        "resources/subscribe",
        move |params: SubscribeParams, ctx: RequestContext| {
            let outcome = subscribe(&subscriptions, ctx, &params.uri);
            async move { outcome }
        },
    );

    let subscriptions = Arc::clone(hub);
    dispatcher.register_typed(
        "resources/unsubscribe",
        move |params: SubscribeParams, ctx: RequestContext| {
            let outcome = unsubscribe(&subscriptions, ctx, &params.uri);
            async move { outcome }
        },
    );

    dispatcher.register_notification(
        "notifications/initialized",
        |_params, ctx: RequestContext| async move {
            info!(
                transport = %ctx.transport,
                listener_id = ?ctx.listener.map(ListenerId::as_u64),
                "client initialized"
            );
        },
    );
}

/// `initialize` result for `info`.
#[must_use]
pub fn initialize_result(info: &ServerInfo) -> Value {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: json!({
            "tools": { "listChanged": true },
            "prompts": { "listChanged": true },
            "resources": { "listChanged": true, "subscribe": true },
        }),
        server_info: info.clone(),
    };
    to_result(&result).unwrap_or_else(|_| json!({}))
}

fn subscribe(hub: &NotificationHub, ctx: RequestContext, uri: &str) -> RpcResult<Value> {
    let listener = require_listener(ctx, "resources/subscribe")?;
    if !hub.subscribe(listener, uri) {
        return Err(ErrorInfo::not_found(format!("listener {listener} is not registered")));
    }
    debug!(listener_id = %listener, uri, "client subscribed");
    Ok(json!({}))
}

fn unsubscribe(hub: &NotificationHub, ctx: RequestContext, uri: &str) -> RpcResult<Value> {
    let listener = require_listener(ctx, "resources/unsubscribe")?;
    let removed = hub.unsubscribe(listener, uri);
    debug!(listener_id = %listener, uri, removed, "client unsubscribed");
    Ok(json!({}))
}

fn require_listener(ctx: RequestContext, method: &str) -> RpcResult<ListenerId> {
    ctx.listener.ok_or_else(|| {
        ErrorInfo::invalid_request(format!(
            "{method} requires a streaming connection or an SSE-bound call"
        ))
    })
}

fn to_result<T: serde::Serialize>(value: &T) -> RpcResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| ErrorInfo::internal(format!("failed to serialize result: {err}")))
}
