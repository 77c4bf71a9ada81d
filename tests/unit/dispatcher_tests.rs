//! Unit tests for method routing and typed params.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mcp_switchboard::protocol::{ErrorInfo, ErrorKind, Notification, Request, RequestId};
use mcp_switchboard::rpc::{Dispatcher, RequestContext};

fn ctx() -> RequestContext {
    RequestContext::stateless(None)
}

fn request(id: i64, method: &str, params: Value) -> Request {
    Request {
        id: RequestId::Number(id),
        method: method.into(),
        params,
    }
}

#[derive(Deserialize)]
struct AddParams {
    a: i64,
    b: i64,
}

#[derive(Serialize)]
struct AddResult {
    sum: i64,
}

fn dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("echo", |params, _ctx| async move { Ok::<_, ErrorInfo>(params) });
    dispatcher.register_typed("math/add", |params: AddParams, _ctx| async move {
        Ok::<_, ErrorInfo>(AddResult {
            sum: params.a + params.b,
        })
    });
    dispatcher.register("fail", |_params, _ctx| async {
        Err::<Value, _>(ErrorInfo::not_found("nothing here"))
    });
    dispatcher
}

/// A registered handler answers with the request's id.
#[tokio::test]
async fn dispatch_runs_handler_and_keeps_id() {
    let response = dispatcher()
        .dispatch(request(4, "echo", json!({ "x": 1 })), ctx())
        .await;
    assert_eq!(response.id, RequestId::Number(4));
    assert_eq!(response.outcome, Ok(json!({ "x": 1 })));
}

/// Unknown methods are answered with `invalid_request`.
#[tokio::test]
async fn unknown_method_is_invalid_request() {
    let response = dispatcher()
        .dispatch(request(1, "foo/bar", Value::Null), ctx())
        .await;
    let err = response.outcome.expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(err.message, "method not found: foo/bar");
    assert_eq!(response.id, RequestId::Number(1));
}

/// Typed handlers receive deserialized params and return serialized results.
#[tokio::test]
async fn typed_handler_round_trips() {
    let response = dispatcher()
        .dispatch(request(2, "math/add", json!({ "a": 2, "b": 3 })), ctx())
        .await;
    assert_eq!(response.outcome, Ok(json!({ "sum": 5 })));
}

/// Params of the wrong shape are refused before the handler runs.
#[tokio::test]
async fn typed_handler_rejects_bad_params() {
    let response = dispatcher()
        .dispatch(request(3, "math/add", json!({ "a": "two" })), ctx())
        .await;
    let err = response.outcome.expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::InvalidParams);
    assert!(err.message.starts_with("invalid params"));
}

/// Absent params are treated as an empty object.
#[tokio::test]
async fn typed_handler_treats_null_as_empty_object() {
    #[derive(Deserialize)]
    struct Optional {
        #[serde(default)]
        verbose: bool,
    }

    let mut dispatcher = Dispatcher::new();
    dispatcher.register_typed("opt", |params: Optional, _ctx| async move {
        Ok::<_, ErrorInfo>(json!({ "verbose": params.verbose }))
    });

    let response = dispatcher.dispatch(request(1, "opt", Value::Null), ctx()).await;
    assert_eq!(response.outcome, Ok(json!({ "verbose": false })));
}

/// Handler errors pass through unchanged.
#[tokio::test]
async fn handler_error_passes_through() {
    let response = dispatcher().dispatch(request(5, "fail", Value::Null), ctx()).await;
    assert_eq!(response.outcome, Err(ErrorInfo::not_found("nothing here")));
}

/// The handler sees the caller's context.
#[tokio::test]
async fn handler_receives_context() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("whoami", |_params, ctx: RequestContext| async move {
        Ok::<_, ErrorInfo>(json!({
            "transport": ctx.transport.as_str(),
            "listener": ctx.listener.map(|l| l.as_u64()),
        }))
    });

    let response = dispatcher
        .dispatch(
            request(1, "whoami", Value::Null),
            RequestContext::stateless(Some(7.into())),
        )
        .await;
    assert_eq!(response.outcome, Ok(json!({ "transport": "http", "listener": 7 })));
}

/// Notifications run their handler and report whether one existed.
#[tokio::test]
async fn notify_reports_handler_presence() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new();
    dispatcher.register_notification("notifications/initialized", move |params, _ctx| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(params);
        }
    });

    let handled = dispatcher
        .notify(
            Notification {
                method: "notifications/initialized".into(),
                params: json!({ "ready": true }),
            },
            ctx(),
        )
        .await;
    assert!(handled);
    assert_eq!(rx.recv().await, Some(json!({ "ready": true })));

    let unhandled = dispatcher
        .notify(
            Notification {
                method: "notifications/unknown".into(),
                params: Value::Null,
            },
            ctx(),
        )
        .await;
    assert!(!unhandled);
}

/// Method names are listed sorted; re-registration replaces.
#[test]
fn methods_are_sorted_and_replaceable() {
    let mut dispatcher = dispatcher();
    dispatcher.register("echo", |_params, _ctx| async { Ok::<_, ErrorInfo>(json!("v2")) });

    assert_eq!(dispatcher.methods(), vec!["echo", "fail", "math/add"]);
    assert!(dispatcher.has_method("math/add"));
    assert!(!dispatcher.has_method("math/sub"));
}
