//! Envelope parsing and validation.
//!
//! Turns raw frame bytes into a [`RequestMessage`] in three stages: framing
//! (splitting a binary frame into its JSON region and binary tail), JSON
//! syntax, then envelope schema. Failures never produce a task; the caller
//! replies directly with the returned [`RejectedRequest`].

use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::Framing;

use super::errors::{JsonRpcError, ValidationError};
use super::message::{JSONRPC_VERSION, RequestId, RequestMessage};

/// Size of the little-endian length prefix of a binary frame.
pub const BINARY_HEADER_BYTES: usize = 4;

/// Successfully parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Validated envelope.
    pub message: RequestMessage,
    /// Binary tail, empty for text frames.
    pub binary: Vec<u8>,
}

/// Binary frame split into its JSON region and raw tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    /// JSON text announced by the length prefix.
    pub json: &'a [u8],
    /// Remaining bytes after the JSON region.
    pub tail: &'a [u8],
}

impl BinaryFrame<'_> {
    /// Whether the frame carries only raw data and no request envelope.
    #[must_use]
    pub fn is_raw_chunk(&self) -> bool {
        self.json.is_empty()
    }
}

/// Request rejected before a task could be built.
///
/// `id` is whatever could be recovered from the envelope so the error can
/// still be correlated; it is [`RequestId::Absent`] when the JSON itself was
/// unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct RejectedRequest {
    /// Recovered request id.
    pub id: RequestId,
    /// Reason for rejection.
    pub error: JsonRpcError,
}

impl RejectedRequest {
    fn new(id: RequestId, error: JsonRpcError) -> Self {
        Self { id, error }
    }

    fn unidentified(error: JsonRpcError) -> Self {
        Self::new(RequestId::Absent, error)
    }
}

/// Parses raw frame bytes into a validated envelope.
///
/// # Errors
///
/// Returns a [`RejectedRequest`] carrying:
/// - [`JsonRpcError::ParsingError`] for malformed JSON or binary framing;
/// - [`JsonRpcError::InvalidRequest`] with per-field errors when the envelope
///   does not match the request schema;
/// - [`JsonRpcError::InvalidRequest`] without details when the version is not
///   `"2.0"` or the method is empty.
pub fn parse(raw: &[u8], framing: Framing) -> Result<Envelope, RejectedRequest> {
    let (json, tail) = match framing {
        Framing::Text => (raw, &[][..]),
        Framing::Binary => {
            let frame = split_binary_frame(raw).map_err(RejectedRequest::unidentified)?;
            (frame.json, frame.tail)
        }
    };

    let value: Value = serde_json::from_slice(json).map_err(|error| {
        RejectedRequest::unidentified(JsonRpcError::parsing(format!(
            "Failed to parse JSON request: {error}"
        )))
    })?;

    let id = recover_id(&value);
    let errors = validate_envelope(&value);
    if !errors.is_empty() {
        return Err(RejectedRequest::new(
            id,
            JsonRpcError::invalid_request_schema(errors),
        ));
    }

    let message: RequestMessage = serde_json::from_value(value).map_err(|error| {
        RejectedRequest::new(id.clone(), JsonRpcError::invalid_request(error.to_string()))
    })?;
    check_header(&message).map_err(|error| RejectedRequest::new(id, error))?;

    Ok(Envelope {
        message,
        binary: tail.to_vec(),
    })
}

/// Splits a binary frame at its length prefix.
///
/// # Errors
///
/// Returns [`JsonRpcError::ParsingError`] when the frame is shorter than the
/// prefix or the announced JSON length exceeds the remaining bytes.
pub fn split_binary_frame(raw: &[u8]) -> Result<BinaryFrame<'_>, JsonRpcError> {
    let Some((header, rest)) = raw.split_first_chunk::<BINARY_HEADER_BYTES>() else {
        return Err(JsonRpcError::parsing(format!(
            "Binary frame of {} bytes is shorter than its {BINARY_HEADER_BYTES}-byte header",
            raw.len()
        )));
    };
    // The length prefix is little-endian on the wire regardless of host order.
    let announced = u32::from_le_bytes(*header);
    let length = usize::try_from(announced)
        .ok()
        .filter(|length| *length <= rest.len())
        .ok_or_else(|| {
            JsonRpcError::parsing(format!(
                "Binary frame announces {announced} JSON bytes but only {} remain",
                rest.len()
            ))
        })?;
    let (json, tail) = rest.split_at(length);
    Ok(BinaryFrame { json, tail })
}

/// Best-effort id extraction so rejections can still be correlated.
fn recover_id(value: &Value) -> RequestId {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
        .unwrap_or_default()
}

fn validate_envelope(value: &Value) -> Vec<ValidationError> {
    let Some(object) = value.as_object() else {
        return vec![ValidationError::new("", "request must be a JSON object")];
    };

    let mut errors = Vec::new();
    require_string(object, "jsonrpc", &mut errors);
    require_string(object, "method", &mut errors);
    if let Some(id) = object.get("id")
        && !is_valid_id(id)
    {
        errors.push(ValidationError::new(
            "/id",
            "expected integer, string or null",
        ));
    }
    errors
}

fn require_string(object: &Map<String, Value>, key: &str, errors: &mut Vec<ValidationError>) {
    match object.get(key) {
        None => errors.push(ValidationError::new(
            format!("/{key}"),
            "missing required property",
        )),
        Some(Value::String(_)) => {}
        Some(_) => errors.push(ValidationError::new(format!("/{key}"), "expected string")),
    }
}

fn is_valid_id(id: &Value) -> bool {
    match id {
        Value::Null | Value::String(_) => true,
        Value::Number(number) => number.is_i64(),
        _ => false,
    }
}

fn check_header(message: &RequestMessage) -> Result<(), JsonRpcError> {
    if message.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcError::invalid_request(format!(
            "Unsupported JSON-RPC version '{}', expected '{JSONRPC_VERSION}'",
            message.jsonrpc
        )));
    }
    if message.method.is_empty() {
        return Err(JsonRpcError::invalid_request("Method must not be empty"));
    }
    Ok(())
}
