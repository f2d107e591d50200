//! Contract between the dispatch layer and method implementations.
//!
//! An [`Entrypoint`] implements one JSON-RPC method. The dispatcher looks it
//! up by name in an [`EntrypointRegistry`] and wraps each request in a task
//! that calls [`Entrypoint::on_request`] on the dispatch thread.
//! Long-running methods report `is_async() == true`, start a
//! [`NetworkTask`](crate::NetworkTask) from `on_request`, and reply later
//! from [`Entrypoint::on_update`], which the service loop calls once per
//! iteration.

mod registry;

use thiserror::Error;

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, ValidationError};

pub use self::registry::{EntrypointRegistry, RegistryError};

/// Failure raised by an entrypoint while handling a request.
#[derive(Debug, Error)]
pub enum EntrypointError {
    /// A protocol error chosen by the entrypoint, forwarded unchanged.
    #[error(transparent)]
    Rpc(#[from] JsonRpcError),
    /// The params failed schema validation.
    #[error("params failed validation ({} errors)", .0.len())]
    Schema(Vec<ValidationError>),
    /// Any other failure; reported to the client as an internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EntrypointError {
    /// Converts the failure into the error sent to the client.
    #[must_use]
    pub fn into_rpc(self) -> JsonRpcError {
        match self {
            Self::Rpc(error) => error,
            Self::Schema(errors) => JsonRpcError::invalid_params_schema(errors),
            Self::Other(error) => JsonRpcError::internal(format!("{error:#}")),
        }
    }
}

/// One JSON-RPC method implementation.
///
/// Methods take `&self` because entrypoints are shared between the registry
/// and every task created for them; implementations needing state keep it
/// behind a [`Mutex`](std::sync::Mutex).
pub trait Entrypoint: Send + Sync {
    /// Method name clients use to reach this entrypoint.
    fn method(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Whether requests run as soon as they are dispatched instead of
    /// waiting in the queue.
    fn has_priority(&self) -> bool {
        false
    }

    /// Whether the entrypoint supports cancellation of in-flight requests.
    fn is_async(&self) -> bool {
        false
    }

    /// Handles one request.
    ///
    /// Synchronous entrypoints must call [`JsonRpcRequest::reply`] exactly
    /// once before returning; asynchronous ones may defer it.
    ///
    /// # Errors
    ///
    /// Any error is converted with [`EntrypointError::into_rpc`] and sent to
    /// the client by the task.
    fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError>;

    /// Asks in-flight work to stop; called only for async entrypoints.
    fn on_cancel(&self) {}

    /// Notifies that the client owning an in-flight or queued request left.
    ///
    /// # Errors
    ///
    /// Failures are logged by the caller and otherwise ignored.
    fn on_disconnect(&self) -> Result<(), EntrypointError> {
        Ok(())
    }

    /// Called once per service loop iteration on the dispatch thread.
    fn on_update(&self) {}
}
