//! Closed error taxonomy for JSON-RPC replies.
//!
//! Every failure that reaches a client is one of these variants. Each maps to
//! a fixed code and carries an optional `data` member; for
//! [`JsonRpcError::InvalidRequest`] and [`JsonRpcError::InvalidParams`] that
//! member holds the structured per-field validation errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Invalid JSON was received.
pub const PARSING_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal failure while handling the request.
pub const INTERNAL_ERROR: i64 = -32603;
/// The task was cancelled before it produced a result.
pub const TASK_CANCELLED: i64 = 1;

/// One schema violation, located by a JSON-pointer-like path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location of the offending value (`""` for the root).
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Builds a validation error for the given path.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Protocol-level error delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonRpcError {
    /// The payload was not valid JSON or the binary frame was malformed.
    #[error("{message}")]
    ParsingError {
        /// What could not be read.
        message: String,
    },
    /// The envelope does not match the request schema.
    #[error("{message}")]
    InvalidRequest {
        /// Summary of the rejection.
        message: String,
        /// Offending envelope fields, empty for header mismatches.
        errors: Vec<ValidationError>,
    },
    /// No entrypoint is registered for the method.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },
    /// The params do not match what the entrypoint expects.
    #[error("{message}")]
    InvalidParams {
        /// Summary of the rejection.
        message: String,
        /// Offending params fields, when known.
        errors: Vec<ValidationError>,
    },
    /// Anything unexpected raised while handling the request.
    #[error("{message}")]
    InternalError {
        /// Description of the failure.
        message: String,
    },
    /// The task was cancelled by the client.
    #[error("Task cancelled")]
    TaskCancelled,
}

impl JsonRpcError {
    /// Creates a parsing error.
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::ParsingError {
            message: message.into(),
        }
    }

    /// Creates an invalid request error without structured details.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Creates an invalid request error listing schema violations.
    pub fn invalid_request_schema(errors: Vec<ValidationError>) -> Self {
        Self::InvalidRequest {
            message: "Invalid request schema".to_owned(),
            errors,
        }
    }

    /// Creates a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates an invalid params error without structured details.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Creates an invalid params error listing schema violations.
    pub fn invalid_params_schema(errors: Vec<ValidationError>) -> Self {
        Self::InvalidParams {
            message: "Invalid params schema".to_owned(),
            errors,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Numeric code sent on the wire.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::ParsingError { .. } => PARSING_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::InternalError { .. } => INTERNAL_ERROR,
            Self::TaskCancelled => TASK_CANCELLED,
        }
    }

    /// Structured validation errors, when there are any.
    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::InvalidRequest { errors, .. } | Self::InvalidParams { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Optional `data` member of the error object.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return None;
        }
        serde_json::to_value(errors).ok()
    }
}
