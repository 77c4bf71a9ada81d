//! Integration tests for the WebSocket transport, using both the crate's
//! client and a bare tungstenite socket.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use mcp_switchboard::hub::event::TOOL_LIST_CHANGED;
use mcp_switchboard::mcp::model::{CallToolResult, ToolDescriptor};
use mcp_switchboard::protocol::ErrorInfo;
use mcp_switchboard::rpc::Dispatcher;
use mcp_switchboard::transport::{ws, ConnectionOptions, TransportKind};

use super::test_helpers::{client_services, eventually, spawn_http, test_state, WAIT};

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_text(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("message within deadline")
            .expect("socket open")
            .expect("valid message");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json text frame");
        }
    }
}

/// The crate's client calls tools on the server over `/ws`.
#[tokio::test]
async fn client_calls_tool_over_websocket() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;
    let (services, _hub) = client_services(Dispatcher::new());

    let (client, _handle) =
        ws::connect(&format!("ws://{addr}/ws"), services, ConnectionOptions::default())
            .await
            .expect("connect");
    assert_eq!(client.transport(), TransportKind::WebSocket);

    let result = client
        .request("tools/call", json!({ "name": "echo", "arguments": { "text": "over ws" } }))
        .await
        .expect("call");
    assert_eq!(result["content"][0]["text"], json!("over ws"));

    let observed = Arc::clone(&state);
    eventually("server listener registered", move || observed.hub.listener_count() == 1).await;
}

/// Closing the client tears down the server side and its listener.
#[tokio::test]
async fn client_close_removes_server_listener() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;
    let (services, _hub) = client_services(Dispatcher::new());

    let (client, handle) =
        ws::connect(&format!("ws://{addr}/ws"), services, ConnectionOptions::default())
            .await
            .expect("connect");
    client.request("ping", Value::Null).await.expect("ping");

    client.close();
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("client driver finished")
        .expect("driver task");

    let observed = Arc::clone(&state);
    eventually("server listener removed", move || observed.hub.listener_count() == 0).await;
}

/// A list change on the server reaches a globally subscribed WebSocket client.
#[tokio::test]
async fn list_change_is_pushed_to_subscriber() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;
    let (services, client_hub) = client_services(Dispatcher::new());
    let (observer, mut observed) = client_hub.register_listener(TransportKind::Stdio);
    client_hub.subscribe(observer, "*");

    let (client, _handle) =
        ws::connect(&format!("ws://{addr}/ws"), services, ConnectionOptions::default())
            .await
            .expect("connect");
    client
        .request("resources/subscribe", json!({ "uri": "*" }))
        .await
        .expect("subscribe");

    state.catalog.add_tool(ToolDescriptor::new("fresh", "new tool"), |_args| async {
        Ok::<_, ErrorInfo>(CallToolResult::text("fresh"))
    });

    let frame = tokio::time::timeout(WAIT, observed.recv())
        .await
        .expect("pushed within deadline")
        .expect("frame");
    let frame: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(frame["method"], json!(TOOL_LIST_CHANGED));
}

/// A bare socket gets strict answers to text and binary frames.
#[tokio::test]
async fn raw_socket_strict_round_trip() {
    let state = test_state();
    let addr = spawn_http(state).await;
    let (mut socket, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");

    socket
        .send(Message::text(
            json!({ "jsonrpc": "2.0", "id": "t1", "method": "tools/list" }).to_string(),
        ))
        .await
        .expect("send text");
    let listed = next_text(&mut socket).await;
    assert_eq!(listed["id"], json!("t1"));
    assert_eq!(listed["result"]["tools"][0]["name"], json!("echo"));

    socket
        .send(Message::binary(
            json!({ "jsonrpc": "2.0", "id": "b1", "method": "ping" })
                .to_string()
                .into_bytes(),
        ))
        .await
        .expect("send binary");
    let pong = next_text(&mut socket).await;
    assert_eq!(pong, json!({ "jsonrpc": "2.0", "id": "b1", "result": {} }));
}

/// Garbage text frames are skipped without dropping the socket.
#[tokio::test]
async fn raw_socket_survives_garbage() {
    let state = test_state();
    let addr = spawn_http(state).await;
    let (mut socket, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");

    socket.send(Message::text("{{{")).await.expect("send garbage");
    socket
        .send(Message::text(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string()))
        .await
        .expect("send ping");

    let pong = next_text(&mut socket).await;
    assert_eq!(pong["id"], json!(1));
}

/// A legacy client is answered in the legacy layout.
#[cfg(feature = "legacy-dialect")]
#[tokio::test]
async fn raw_socket_legacy_round_trip() {
    let state = test_state();
    let addr = spawn_http(state).await;
    let (mut socket, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");

    socket
        .send(Message::text(
            json!({ "type": "readResource", "messageId": "w1", "uri": "switchboard://status" })
                .to_string(),
        ))
        .await
        .expect("send");

    let response = next_text(&mut socket).await;
    assert_eq!(response["type"], json!("response"));
    assert_eq!(response["messageId"], json!("w1"));
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"]["contents"][0]["uri"], json!("switchboard://status"));
}
