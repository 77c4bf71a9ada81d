//! Legacy `type`/`messageId`/`success` dialect.
//!
//! Older clients speak an ad-hoc format predating JSON-RPC:
//!
//! ```json
//! {"type":"request","messageId":"m1","method":"tools/call","name":"echo","args":{"text":"hi"}}
//! {"type":"callTool","messageId":"m2","name":"echo","args":{"text":"hi"}}
//! {"type":"response","messageId":"m1","success":true,"result":{}}
//! ```
//!
//! Decoding is only reached after strict parsing failed. It never invents an
//! id: a request-shaped message without `messageId` (or `id`) is rejected.
//!
//! | `type`          | Method                  | Params                    |
//! |-----------------|-------------------------|---------------------------|
//! | `request`       | value of `method`       | `args` / `params`         |
//! | `notification`  | value of `method`       | `params` / `args`         |
//! | `initialize`    | `initialize`            | `args` or remaining keys  |
//! | `ping`          | `ping`                  | `args` or remaining keys  |
//! | `listTools`     | `tools/list`            | `args` or remaining keys  |
//! | `callTool`      | `tools/call`            | `{name, arguments}`       |
//! | `listPrompts`   | `prompts/list`          | `args` or remaining keys  |
//! | `getPrompt`     | `prompts/get`           | `{name, arguments}`       |
//! | `listResources` | `resources/list`        | `args` or remaining keys  |
//! | `readResource`  | `resources/read`        | `{uri}`                   |
//! | `subscribe`     | `resources/subscribe`   | `{uri}`                   |
//! | `unsubscribe`   | `resources/unsubscribe` | `{uri}`                   |

use serde_json::{json, Map, Value};

use super::codec::{error_from_value, error_to_value, id_to_value, parse_id};
use super::envelope::{Envelope, ErrorInfo, Notification, Request, RequestId, Response};
use crate::{AppError, Result};

/// Keys that belong to the legacy envelope itself rather than its params.
const ENVELOPE_KEYS: [&str; 3] = ["type", "messageId", "id"];

/// Encode an envelope in the legacy layout.
pub(crate) fn encode(envelope: &Envelope) -> Value {
    match envelope {
        Envelope::Request(request) => json!({
            "type": "request",
            "messageId": id_to_value(&request.id),
            "method": request.method,
            "args": request.params,
        }),
        Envelope::Response(response) => match &response.outcome {
            Ok(result) => json!({
                "type": "response",
                "messageId": id_to_value(&response.id),
                "success": true,
                "result": result,
            }),
            Err(error) => json!({
                "type": "response",
                "messageId": id_to_value(&response.id),
                "success": false,
                "error": error_to_value(error),
            }),
        },
        Envelope::Notification(notification) => json!({
            "type": "notification",
            "method": notification.method,
            "params": notification.params,
        }),
    }
}

/// Decode a legacy-layout object.
#[cfg_attr(not(feature = "legacy-dialect"), allow(dead_code))]
pub(crate) fn decode(object: &Map<String, Value>) -> Result<Envelope> {
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Protocol("not an envelope: no `jsonrpc` or `type`".into()))?;

    match kind {
        "response" => decode_response(object),
        "notification" => {
            let method = required_str(object, "method")?;
            let params = object
                .get("params")
                .or_else(|| object.get("args"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(Envelope::Notification(Notification { method, params }))
        }
        "request" => {
            let id = required_id(object)?;
            let method = required_str(object, "method")?;
            let params = if object.contains_key("name") {
                named_params(object)
            } else {
                object
                    .get("args")
                    .or_else(|| object.get("params"))
                    .cloned()
                    .unwrap_or(Value::Null)
            };
            Ok(Envelope::Request(Request { id, method, params }))
        }
        shorthand => {
            let method = shorthand_method(shorthand).ok_or_else(|| {
                AppError::Protocol(format!("unknown legacy message type: {shorthand}"))
            })?;
            let id = required_id(object)?;
            let params = match method {
                "tools/call" | "prompts/get" => named_params(object),
                "resources/read" | "resources/subscribe" | "resources/unsubscribe" => {
                    uri_params(object)
                }
                _ => remaining_params(object),
            };
            Ok(Envelope::Request(Request {
                id,
                method: method.to_owned(),
                params,
            }))
        }
    }
}

fn shorthand_method(kind: &str) -> Option<&'static str> {
    let method = match kind {
        "initialize" => "initialize",
        "ping" => "ping",
        "listTools" => "tools/list",
        "callTool" => "tools/call",
        "listPrompts" => "prompts/list",
        "getPrompt" => "prompts/get",
        "listResources" => "resources/list",
        "readResource" => "resources/read",
        "subscribe" => "resources/subscribe",
        "unsubscribe" => "resources/unsubscribe",
        _ => return None,
    };
    Some(method)
}

fn decode_response(object: &Map<String, Value>) -> Result<Envelope> {
    let id = required_id(object)?;
    let error = object.get("error").filter(|e| !e.is_null());
    let success = object
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(error.is_none());

    let response = if success {
        let result = object
            .get("result")
            .or_else(|| object.get("content"))
            .cloned()
            .unwrap_or(Value::Null);
        Response::success(id, result)
    } else {
        let error = error.map_or_else(
            || ErrorInfo::internal("legacy response reported failure without an error"),
            error_from_value,
        );
        Response::failure(id, error)
    };
    Ok(Envelope::Response(response))
}

fn required_id(object: &Map<String, Value>) -> Result<RequestId> {
    let raw = object.get("messageId").or_else(|| object.get("id"));
    raw.map(parse_id)
        .transpose()?
        .flatten()
        .ok_or_else(|| AppError::Protocol("legacy message missing `messageId`".into()))
}

fn required_str(object: &Map<String, Value>, key: &str) -> Result<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AppError::Protocol(format!("legacy message missing `{key}`")))
}

/// `{name, arguments}` built from the top-level `name` and `args` keys.
fn named_params(object: &Map<String, Value>) -> Value {
    let mut params = Map::new();
    if let Some(name) = object.get("name") {
        params.insert("name".into(), name.clone());
    }
    let arguments = object
        .get("args")
        .or_else(|| object.get("arguments"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    params.insert("arguments".into(), arguments);
    Value::Object(params)
}

fn uri_params(object: &Map<String, Value>) -> Value {
    match object.get("uri") {
        Some(uri) => json!({ "uri": uri }),
        None => object.get("args").cloned().unwrap_or(Value::Null),
    }
}

/// `args` when present, otherwise every non-envelope key.
fn remaining_params(object: &Map<String, Value>) -> Value {
    if let Some(args) = object.get("args") {
        return args.clone();
    }
    let rest: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if rest.is_empty() {
        Value::Null
    } else {
        Value::Object(rest)
    }
}
