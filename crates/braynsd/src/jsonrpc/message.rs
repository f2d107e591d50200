//! Envelope value types and outbound message shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::JsonRpcError;

/// Protocol version every request must declare.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of out-of-band progress pushes.
pub const PROGRESS_METHOD: &str = "progress";

/// Request identifier.
///
/// An absent (or `null`) id marks a notification: it is never replied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Integer(i64),
    /// String identifier.
    String(String),
    /// No identifier: the request is a notification.
    #[default]
    Absent,
}

impl RequestId {
    /// Returns `true` for notifications.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::String(value) => write!(formatter, "\"{value}\""),
            Self::Absent => formatter.write_str("<none>"),
        }
    }
}

/// Validated JSON-RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Protocol version, `"2.0"` once validated.
    pub jsonrpc: String,
    /// Method name, non-empty once validated.
    pub method: String,
    /// Method parameters, `null` when omitted.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    /// Request id, absent for notifications.
    #[serde(default, skip_serializing_if = "RequestId::is_empty")]
    pub id: RequestId,
}

impl RequestMessage {
    /// Builds a `"2.0"` request.
    pub fn new(method: impl Into<String>, params: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Successful response.
#[derive(Debug, Serialize)]
pub struct ReplyMessage<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    result: &'a Value,
}

impl<'a> ReplyMessage<'a> {
    /// Builds a reply to the given id.
    #[must_use]
    pub fn new(id: &'a RequestId, result: &'a Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Error object nested inside an [`ErrorMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&JsonRpcError> for ErrorPayload {
    fn from(error: &JsonRpcError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            data: error.data(),
        }
    }
}

/// Error response.
///
/// Unlike replies, errors may carry a `null` id when the request id could not
/// be recovered from a rejected envelope.
#[derive(Debug, Serialize)]
pub struct ErrorMessage<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    error: ErrorPayload,
}

impl<'a> ErrorMessage<'a> {
    /// Builds an error response to the given id.
    #[must_use]
    pub fn new(id: &'a RequestId, error: &JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: ErrorPayload::from(error),
        }
    }
}

/// Parameters of a progress push.
#[derive(Debug, Serialize)]
pub struct ProgressParams<'a> {
    id: &'a RequestId,
    operation: &'a str,
    amount: f64,
}

/// Out-of-band progress notification for a running request.
#[derive(Debug, Serialize)]
pub struct ProgressMessage<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ProgressParams<'a>,
}

impl<'a> ProgressMessage<'a> {
    /// Builds a progress push; `amount` is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(id: &'a RequestId, operation: &'a str, amount: f64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: PROGRESS_METHOD,
            params: ProgressParams {
                id,
                operation,
                amount: amount.clamp(0.0, 1.0),
            },
        }
    }
}
