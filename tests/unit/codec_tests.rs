//! Unit tests for strict envelope encoding and dialect-detecting decoding.

use serde_json::{json, Value};

use mcp_switchboard::protocol::codec::{decode_value, error_from_value, to_value};
use mcp_switchboard::protocol::{
    decode, encode, DecodeOptions, Dialect, Envelope, ErrorInfo, ErrorKind, Notification, Request,
    RequestId, Response,
};
use mcp_switchboard::AppError;

fn decode_strict(raw: &str) -> mcp_switchboard::Result<Envelope> {
    decode(raw, DecodeOptions::strict()).map(|inbound| {
        assert_eq!(inbound.dialect, Dialect::Strict);
        inbound.envelope
    })
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// A strict request survives encode → decode with every field intact.
#[test]
fn strict_request_round_trips() {
    let request = Envelope::Request(Request {
        id: RequestId::from("req-1"),
        method: "prompts/get".into(),
        params: json!({ "name": "greeting", "arguments": { "name": "Ada" } }),
    });

    let decoded = decode_strict(&encode(&request, Dialect::Strict)).expect("decode");
    assert_eq!(decoded, request);
}

/// Error responses keep kind, message and data across the wire.
#[test]
fn strict_error_response_round_trips() {
    let response = Envelope::Response(Response::failure(
        RequestId::Number(9),
        ErrorInfo::not_found("unknown prompt: nope").with_data(json!({ "name": "nope" })),
    ));

    let wire = to_value(&response, Dialect::Strict);
    assert_eq!(wire["error"]["code"], json!(-32002));
    assert_eq!(wire["error"]["data"]["name"], json!("nope"));

    let decoded = decode_strict(&wire.to_string()).expect("decode");
    assert_eq!(decoded, response);
}

/// Null params are omitted from strict requests and notifications.
#[test]
fn strict_encoding_omits_null_params() {
    let notification = Envelope::Notification(Notification {
        method: "notifications/tools/list_changed".into(),
        params: Value::Null,
    });

    let wire = to_value(&notification, Dialect::Strict);
    assert_eq!(wire, json!({ "jsonrpc": "2.0", "method": "notifications/tools/list_changed" }));
}

/// Encoded frames never contain a raw newline, so they are safe for line framing.
#[test]
fn encoded_frame_is_single_line() {
    let request = Envelope::Request(Request {
        id: RequestId::Number(1),
        method: "tools/call".into(),
        params: json!({ "name": "echo", "arguments": { "text": "line one\nline two" } }),
    });

    assert!(!encode(&request, Dialect::Strict).contains('\n'));
}

// ── Strict decoding ───────────────────────────────────────────────────────────

/// A message with `method` and no id is a notification; a null id counts as absent.
#[test]
fn method_without_id_is_notification() {
    let plain = decode_strict(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .expect("decode");
    let null_id =
        decode_strict(r#"{"jsonrpc":"2.0","id":null,"method":"notifications/initialized"}"#)
            .expect("decode");

    for envelope in [plain, null_id] {
        assert!(
            matches!(
                envelope,
                Envelope::Notification(ref n) if n.method == "notifications/initialized"
            ),
            "expected notification, got {envelope:?}"
        );
    }
}

/// Integer and string ids are both accepted and kept distinct.
#[test]
fn numeric_and_string_ids_are_distinct() {
    let numeric = decode_strict(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).expect("decode");
    let string = decode_strict(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).expect("decode");

    let Envelope::Response(numeric) = numeric else { panic!("expected response") };
    let Envelope::Response(string) = string else { panic!("expected response") };
    assert_eq!(numeric.id, RequestId::Number(7));
    assert_eq!(string.id, RequestId::String("7".into()));
    assert_ne!(numeric.id, string.id);
}

/// A response must carry exactly one of `result` and `error`.
#[test]
fn response_with_result_and_error_is_rejected() {
    let err = decode_strict(
        r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":-32603,"message":"x"}}"#,
    )
    .expect_err("both members must be rejected");
    assert!(matches!(err, AppError::Protocol(_)), "got {err:?}");
}

/// A response without an id cannot be correlated and is rejected.
#[test]
fn response_without_id_is_rejected() {
    let err = decode_strict(r#"{"jsonrpc":"2.0","result":{}}"#).expect_err("must fail");
    assert!(matches!(err, AppError::Protocol(_)));
}

/// Only version `2.0` is accepted, and a wrong version never falls back to legacy.
#[test]
fn wrong_version_is_rejected_even_with_legacy_enabled() {
    let err = decode(
        r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#,
        DecodeOptions { accept_legacy: true },
    )
    .expect_err("must fail");
    assert!(err.to_string().contains("unsupported jsonrpc version"), "got {err}");
}

/// Messages carrying both `jsonrpc` and `type` are refused instead of guessed.
#[test]
fn ambiguous_dialect_is_rejected() {
    let err = decode(
        r#"{"jsonrpc":"2.0","type":"request","id":1,"method":"ping"}"#,
        DecodeOptions { accept_legacy: true },
    )
    .expect_err("must fail");
    assert!(err.to_string().contains("ambiguous"), "got {err}");
}

/// Invalid JSON is a recoverable codec error.
#[test]
fn malformed_json_is_recoverable_codec_error() {
    let err = decode("{not json", DecodeOptions::default()).expect_err("must fail");
    assert!(matches!(err, AppError::Codec(_)), "got {err:?}");
    assert!(err.is_recoverable());
}

/// Non-object JSON is a recoverable protocol error.
#[test]
fn non_object_is_rejected() {
    for raw in ["[]", "42", "\"ping\"", "null"] {
        let err = decode(raw, DecodeOptions::default()).expect_err("must fail");
        assert!(matches!(err, AppError::Protocol(_)), "{raw}: got {err:?}");
        assert!(err.is_recoverable());
    }
}

/// With legacy disabled, a legacy-shaped message is rejected.
#[test]
fn strict_options_refuse_legacy_shapes() {
    let err = decode(r#"{"type":"ping","messageId":"m1"}"#, DecodeOptions::strict())
        .expect_err("must fail");
    assert!(matches!(err, AppError::Protocol(_)));
}

/// `decode_value` accepts an already-parsed value.
#[test]
fn decode_value_accepts_parsed_json() {
    let inbound = decode_value(
        json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }),
        DecodeOptions::strict(),
    )
    .expect("decode");
    assert!(matches!(inbound.envelope, Envelope::Request(ref r) if r.method == "ping"));
}

// ── Error taxonomy ────────────────────────────────────────────────────────────

/// Each kind maps to its wire code; everything without a dedicated code is -32603.
#[test]
fn error_kinds_map_to_wire_codes() {
    assert_eq!(ErrorKind::NotFound.code(), -32002);
    assert_eq!(ErrorKind::InvalidRequest.code(), -32600);
    assert_eq!(ErrorKind::InvalidParams.code(), -32602);
    assert_eq!(ErrorKind::Internal.code(), -32603);
    assert_eq!(ErrorKind::Timeout.code(), -32603);
    assert_eq!(ErrorKind::ConnectionClosed.code(), -32603);
}

/// Foreign JSON-RPC codes fold into the closest kind.
#[test]
fn foreign_codes_fold_into_taxonomy() {
    assert_eq!(ErrorKind::from_code(-32601), ErrorKind::InvalidRequest);
    assert_eq!(ErrorKind::from_code(-32700), ErrorKind::InvalidRequest);
    assert_eq!(ErrorKind::from_code(-32602), ErrorKind::InvalidParams);
    assert_eq!(ErrorKind::from_code(-1), ErrorKind::Internal);
}

/// Error members may use a taxonomy tag or a bare string.
#[test]
fn error_members_accept_tags_and_strings() {
    let tagged = error_from_value(&json!({ "code": "timeout", "message": "slow" }));
    assert_eq!(tagged.kind, ErrorKind::Timeout);
    assert_eq!(tagged.message, "slow");

    let bare = error_from_value(&json!("boom"));
    assert_eq!(bare.kind, ErrorKind::Internal);
    assert_eq!(bare.message, "boom");

    let unknown = error_from_value(&json!({ "code": "weird", "message": "?" }));
    assert_eq!(unknown.kind, ErrorKind::Internal);
}
