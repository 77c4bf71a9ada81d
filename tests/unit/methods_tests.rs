//! Unit tests for the MCP method surface installed on the dispatcher.

use serde_json::{json, Value};

use mcp_switchboard::config::GlobalConfig;
use mcp_switchboard::mcp::builtin;
use mcp_switchboard::mcp::methods::PROTOCOL_VERSION;
use mcp_switchboard::protocol::{ErrorKind, Request, RequestId, RpcResult};
use mcp_switchboard::rpc::RequestContext;
use mcp_switchboard::server::AppState;
use mcp_switchboard::transport::TransportKind;

fn state() -> AppState {
    let state = AppState::new(GlobalConfig::default());
    builtin::install(&state.catalog, &state.hub);
    state
}

async fn call(
    state: &AppState,
    method: &str,
    params: Value,
    ctx: RequestContext,
) -> RpcResult<Value> {
    state
        .dispatcher
        .dispatch(
            Request {
                id: RequestId::Number(1),
                method: method.into(),
                params,
            },
            ctx,
        )
        .await
        .outcome
}

/// Every MCP method is registered.
#[test]
fn every_method_is_registered() {
    let state = state();
    for method in [
        "initialize",
        "ping",
        "tools/list",
        "tools/call",
        "prompts/list",
        "prompts/get",
        "resources/list",
        "resources/read",
        "resources/subscribe",
        "resources/unsubscribe",
    ] {
        assert!(state.dispatcher.has_method(method), "{method} missing");
    }
}

/// `initialize` reports protocol version, capabilities and server identity.
#[tokio::test]
async fn initialize_reports_capabilities() {
    let state = state();
    let result = call(&state, "initialize", json!({}), RequestContext::stateless(None))
        .await
        .expect("initialize");

    assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
    assert_eq!(result["serverInfo"]["name"], json!("mcp-switchboard"));
    assert_eq!(result["capabilities"]["resources"]["subscribe"], json!(true));
    assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(true));
}

/// List methods return the installed built-ins.
#[tokio::test]
async fn list_methods_return_builtins() {
    let state = state();
    let ctx = RequestContext::stateless(None);

    let tools = call(&state, "tools/list", Value::Null, ctx).await.expect("tools");
    let prompts = call(&state, "prompts/list", Value::Null, ctx).await.expect("prompts");
    let resources = call(&state, "resources/list", Value::Null, ctx).await.expect("resources");

    assert_eq!(tools["tools"][0]["name"], json!("echo"));
    assert_eq!(prompts["prompts"][0]["name"], json!("greeting"));
    assert_eq!(resources["resources"][0]["uri"], json!(builtin::STATUS_URI));
}

/// `tools/call` routes through the catalog and reports content blocks.
#[tokio::test]
async fn tools_call_returns_content() {
    let state = state();
    let result = call(
        &state,
        "tools/call",
        json!({ "name": "echo", "arguments": { "text": "hi" } }),
        RequestContext::stateless(None),
    )
    .await
    .expect("call");

    assert_eq!(result, json!({ "content": [{ "type": "text", "text": "hi" }], "isError": false }));
}

/// `tools/call` without a name is `invalid_params`.
#[tokio::test]
async fn tools_call_without_name_is_invalid_params() {
    let state = state();
    let err = call(&state, "tools/call", json!({}), RequestContext::stateless(None))
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::InvalidParams);
}

/// Subscribing needs a listener to deliver to.
#[tokio::test]
async fn subscribe_without_listener_is_rejected() {
    let state = state();
    let err = call(
        &state,
        "resources/subscribe",
        json!({ "uri": "file:///a.txt" }),
        RequestContext::stateless(None),
    )
    .await
    .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
}

/// Subscribe and unsubscribe update the hub for the caller's listener.
#[tokio::test]
async fn subscribe_and_unsubscribe_update_hub() {
    let state = state();
    let (listener, _rx) = state.hub.register_listener(TransportKind::Sse);
    let ctx = RequestContext::stateless(Some(listener));

    let result = call(&state, "resources/subscribe", json!({ "uri": "file:///a.txt" }), ctx)
        .await
        .expect("subscribe");
    assert_eq!(result, json!({}));
    assert_eq!(state.hub.subscriptions_of(listener), vec!["file:///a.txt".to_owned()]);

    call(&state, "resources/unsubscribe", json!({ "uri": "file:///a.txt" }), ctx)
        .await
        .expect("unsubscribe");
    assert!(state.hub.subscriptions_of(listener).is_empty());
}

/// Subscribing on behalf of a listener that is gone is `not_found`.
#[tokio::test]
async fn subscribe_for_removed_listener_is_not_found() {
    let state = state();
    let (listener, _rx) = state.hub.register_listener(TransportKind::Sse);
    state.hub.remove_listener(listener);

    let err = call(
        &state,
        "resources/subscribe",
        json!({ "uri": "file:///a.txt" }),
        RequestContext::stateless(Some(listener)),
    )
    .await
    .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

/// `ping` answers with an empty object.
#[tokio::test]
async fn ping_returns_empty_object() {
    let state = state();
    let result = call(&state, "ping", Value::Null, RequestContext::stateless(None))
        .await
        .expect("ping");
    assert_eq!(result, json!({}));
}
