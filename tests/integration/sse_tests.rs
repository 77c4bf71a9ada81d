//! Integration tests for the server-sent events stream.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};

use mcp_switchboard::hub::event::{RESOURCE_UPDATED, TOOL_LIST_CHANGED};
use mcp_switchboard::hub::ListenerId;
use mcp_switchboard::mcp::builtin::STATUS_URI;
use mcp_switchboard::mcp::model::{CallToolResult, ToolDescriptor};
use mcp_switchboard::protocol::ErrorInfo;

use super::test_helpers::{eventually, spawn_http, test_state, WAIT};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Incremental `text/event-stream` reader.
struct EventReader {
    body: ByteStream,
    buffer: String,
}

impl EventReader {
    async fn open(url: &str) -> Self {
        let response = reqwest::get(url).await.expect("GET /sse");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream")));
        Self {
            body: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Next `(event, data)` pair, skipping keep-alive comments.
    async fn next_event(&mut self) -> (String, String) {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut event = String::from("message");
                let mut data = Vec::new();
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        event = value.trim_start().to_owned();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push(value.trim_start().to_owned());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                return (event, data.join("\n"));
            }

            let chunk = tokio::time::timeout(WAIT, self.body.next())
                .await
                .expect("event within deadline")
                .expect("stream open")
                .expect("chunk");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// The endpoint event's POST path and the listener it names.
    async fn endpoint(&mut self) -> (String, ListenerId) {
        let (event, path) = self.next_event().await;
        assert_eq!(event, "endpoint");
        let listener = path
            .rsplit('=')
            .next()
            .and_then(|id| id.parse().ok())
            .expect("listener id in endpoint");
        (path, listener)
    }

    async fn next_message(&mut self) -> Value {
        let (event, data) = self.next_event().await;
        assert_eq!(event, "message");
        serde_json::from_str(&data).expect("json message")
    }
}

/// The stream opens with an endpoint event bound to a fresh listener.
#[tokio::test]
async fn stream_starts_with_endpoint() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;

    let mut events = EventReader::open(&format!("http://{addr}/sse")).await;
    let (path, listener) = events.endpoint().await;

    assert_eq!(path, format!("/rpc?listener={listener}"));
    assert!(state.hub.contains(listener));
}

/// Query subscriptions are applied before the first event.
#[tokio::test]
async fn query_subscriptions_deliver_updates() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;

    let mut events =
        EventReader::open(&format!("http://{addr}/sse?subscribe={STATUS_URI}&subscribe=*")).await;
    let (_path, listener) = events.endpoint().await;
    assert_eq!(
        state.hub.subscriptions_of(listener),
        vec!["*".to_owned(), STATUS_URI.to_owned()]
    );

    state.catalog.resource_updated(STATUS_URI);
    let message = events.next_message().await;
    assert_eq!(
        message,
        json!({ "jsonrpc": "2.0", "method": RESOURCE_UPDATED, "params": { "uri": STATUS_URI } })
    );

    state.catalog.add_tool(ToolDescriptor::new("sse-tool", "t"), |_args| async {
        Ok::<_, ErrorInfo>(CallToolResult::text(""))
    });
    assert_eq!(events.next_message().await["method"], json!(TOOL_LIST_CHANGED));
}

/// A subscribe posted to the endpoint path attaches to the stream's listener.
#[tokio::test]
async fn endpoint_bound_subscribe_reaches_stream() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;

    let mut events = EventReader::open(&format!("http://{addr}/sse")).await;
    let (path, listener) = events.endpoint().await;

    let reply: Value = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "resources/subscribe",
            "params": { "uri": "mem://notes" },
        }))
        .send()
        .await
        .expect("POST subscribe")
        .json()
        .await
        .expect("json reply");
    assert_eq!(reply["result"], json!({}));
    assert_eq!(state.hub.subscriptions_of(listener), vec!["mem://notes".to_owned()]);

    let report = state.catalog.resource_updated("mem://notes");
    assert_eq!(report.delivered, 1);
    assert_eq!(events.next_message().await["params"]["uri"], json!("mem://notes"));
}

/// Dropping the stream removes its listener.
#[tokio::test]
async fn disconnect_removes_listener() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;

    let mut events = EventReader::open(&format!("http://{addr}/sse?subscribe=*")).await;
    let (_path, listener) = events.endpoint().await;
    assert!(state.hub.contains(listener));

    drop(events);

    let observed = Arc::clone(&state);
    eventually("sse listener removed", move || !observed.hub.contains(listener)).await;
    assert_eq!(state.hub.subscriber_count("*"), 0);
}

/// Shutdown ends open streams.
#[tokio::test]
async fn shutdown_ends_stream() {
    let state = test_state();
    let addr = spawn_http(Arc::clone(&state)).await;

    let mut events = EventReader::open(&format!("http://{addr}/sse")).await;
    let _ = events.endpoint().await;

    state.shutdown.cancel();

    let end = tokio::time::timeout(WAIT, async {
        while let Some(chunk) = events.body.next().await {
            if chunk.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stream must end after shutdown");
}
