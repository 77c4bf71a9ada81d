//! Envelope encoding and dialect-detecting decoding.
//!
//! Decoding always tries the strict JSON-RPC 2.0 layout first. Only when that
//! fails, and the message does not claim to be JSON-RPC, is the legacy shim
//! consulted (feature `legacy-dialect`, runtime [`DecodeOptions::accept_legacy`]).
//! A message carrying both a `jsonrpc` and a `type` member is rejected as
//! ambiguous instead of guessed.

use serde_json::{json, Map, Value};

use super::envelope::{
    Dialect, Envelope, ErrorInfo, ErrorKind, Notification, Request, RequestId, Response,
};
use crate::{AppError, Result};

/// Protocol version string of the strict dialect.
pub const JSONRPC_VERSION: &str = "2.0";

/// Decoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Fall back to the legacy dialect when strict parsing fails.
    pub accept_legacy: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            accept_legacy: cfg!(feature = "legacy-dialect"),
        }
    }
}

impl DecodeOptions {
    /// Strict JSON-RPC only.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            accept_legacy: false,
        }
    }
}

/// A decoded envelope together with the dialect it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Decoded message.
    pub envelope: Envelope,
    /// Dialect detected on the wire.
    pub dialect: Dialect,
}

/// Encode an envelope as a single-line JSON string in `dialect`.
#[must_use]
pub fn encode(envelope: &Envelope, dialect: Dialect) -> String {
    to_value(envelope, dialect).to_string()
}

/// Encode an envelope as a JSON value in `dialect`.
#[must_use]
pub fn to_value(envelope: &Envelope, dialect: Dialect) -> Value {
    match dialect {
        Dialect::Strict => encode_strict(envelope),
        Dialect::Legacy => super::legacy::encode(envelope),
    }
}

fn encode_strict(envelope: &Envelope) -> Value {
    let mut object = Map::new();
    object.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));

    match envelope {
        Envelope::Request(request) => {
            object.insert("id".into(), id_to_value(&request.id));
            object.insert("method".into(), Value::from(request.method.as_str()));
            if !request.params.is_null() {
                object.insert("params".into(), request.params.clone());
            }
        }
        Envelope::Response(response) => {
            object.insert("id".into(), id_to_value(&response.id));
            match &response.outcome {
                Ok(result) => {
                    object.insert("result".into(), result.clone());
                }
                Err(error) => {
                    object.insert("error".into(), error_to_value(error));
                }
            }
        }
        Envelope::Notification(notification) => {
            object.insert("method".into(), Value::from(notification.method.as_str()));
            if !notification.params.is_null() {
                object.insert("params".into(), notification.params.clone());
            }
        }
    }

    Value::Object(object)
}

/// Encode an [`ErrorInfo`] as `{code, message, data?}`.
#[must_use]
pub fn error_to_value(error: &ErrorInfo) -> Value {
    let mut value = json!({
        "code": error.code(),
        "message": error.message,
    });
    if let (Some(data), Value::Object(object)) = (&error.data, &mut value) {
        object.insert("data".into(), data.clone());
    }
    value
}

/// Decode an error member.
///
/// Accepts `{code, message, data?}` with a numeric code or a taxonomy tag, or
/// a bare string (treated as an internal error message).
#[must_use]
pub fn error_from_value(value: &Value) -> ErrorInfo {
    match value {
        Value::Object(object) => {
            let kind = match object.get("code") {
                Some(Value::Number(code)) => code
                    .as_i64()
                    .map_or(ErrorKind::Internal, ErrorKind::from_code),
                Some(Value::String(tag)) => ErrorKind::from_tag(tag),
                _ => ErrorKind::Internal,
            };
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            ErrorInfo {
                kind,
                message,
                data: object.get("data").cloned(),
            }
        }
        Value::String(message) => ErrorInfo::internal(message.clone()),
        other => ErrorInfo::internal(other.to_string()),
    }
}

/// Decode one wire frame.
///
/// # Errors
///
/// - [`AppError::Codec`] if `text` is not valid JSON.
/// - [`AppError::Protocol`] if the JSON is not an envelope in any enabled dialect.
pub fn decode(text: &str, options: DecodeOptions) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value, options)
}

/// Decode an already-parsed JSON value.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if the value is not an envelope in any
/// enabled dialect, or if it is ambiguous between dialects.
pub fn decode_value(value: Value, options: DecodeOptions) -> Result<Inbound> {
    let Value::Object(object) = value else {
        return Err(AppError::Protocol("envelope must be a JSON object".into()));
    };

    let claims_strict = object.contains_key("jsonrpc");
    if claims_strict && object.contains_key("type") {
        return Err(AppError::Protocol(
            "ambiguous envelope: carries both `jsonrpc` and `type`".into(),
        ));
    }

    match decode_strict(&object) {
        Ok(envelope) => Ok(Inbound {
            envelope,
            dialect: Dialect::Strict,
        }),
        Err(strict_err) if claims_strict => Err(strict_err),
        Err(strict_err) => decode_fallback(&object, options, strict_err),
    }
}

#[cfg(feature = "legacy-dialect")]
fn decode_fallback(
    object: &Map<String, Value>,
    options: DecodeOptions,
    strict_err: AppError,
) -> Result<Inbound> {
    if !options.accept_legacy {
        return Err(strict_err);
    }
    super::legacy::decode(object).map(|envelope| Inbound {
        envelope,
        dialect: Dialect::Legacy,
    })
}

#[cfg(not(feature = "legacy-dialect"))]
fn decode_fallback(
    _object: &Map<String, Value>,
    _options: DecodeOptions,
    strict_err: AppError,
) -> Result<Inbound> {
    Err(strict_err)
}

fn decode_strict(object: &Map<String, Value>) -> Result<Envelope> {
    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(AppError::Protocol(format!(
                "unsupported jsonrpc version: {other}"
            )))
        }
        None => return Err(AppError::Protocol("missing `jsonrpc` member".into())),
    }

    let id = object.get("id").map(parse_id).transpose()?.flatten();

    if let Some(method) = object.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| AppError::Protocol("`method` must be a string".into()))?
            .to_owned();
        let params = object.get("params").cloned().unwrap_or(Value::Null);
        return Ok(match id {
            Some(id) => Envelope::Request(Request { id, method, params }),
            None => Envelope::Notification(Notification { method, params }),
        });
    }

    let id = id.ok_or_else(|| AppError::Protocol("response without id".into()))?;
    match (object.get("result"), object.get("error")) {
        (Some(result), None) => Ok(Envelope::Response(Response::success(id, result.clone()))),
        (None, Some(error)) => Ok(Envelope::Response(Response::failure(
            id,
            error_from_value(error),
        ))),
        (Some(_), Some(_)) => Err(AppError::Protocol(
            "response carries both `result` and `error`".into(),
        )),
        (None, None) => Err(AppError::Protocol(
            "envelope has neither `method`, `result` nor `error`".into(),
        )),
    }
}

/// Parse an id member. `null` is treated as absent.
pub(crate) fn parse_id(value: &Value) -> Result<Option<RequestId>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(RequestId::String(s.clone()))),
        Value::Number(n) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| AppError::Protocol(format!("id must be an integer: {n}"))),
        other => Err(AppError::Protocol(format!(
            "id must be a string or integer: {other}"
        ))),
    }
}

pub(crate) fn id_to_value(id: &RequestId) -> Value {
    match id {
        RequestId::Number(n) => Value::from(*n),
        RequestId::String(s) => Value::from(s.as_str()),
    }
}
