//! Parsed request bound to the client that sent it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ClientRef;

use super::REQUEST_TARGET;
use super::errors::JsonRpcError;
use super::message::{ErrorMessage, ProgressMessage, ReplyMessage, RequestId, RequestMessage};

/// A validated request together with its reply channel.
///
/// Clones share the same "answered" state, so a request handed to a worker
/// thread and the copy kept by the task still agree on whether the single
/// permitted reply has been sent, and whether the client has gone. Every
/// operation is a no-op for notifications and for closed requests.
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    client: ClientRef,
    message: Arc<RequestMessage>,
    binary: Arc<[u8]>,
    answered: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl JsonRpcRequest {
    /// Binds a message (and optional binary tail) to its client.
    #[must_use]
    pub fn new(client: ClientRef, message: RequestMessage, binary: Vec<u8>) -> Self {
        Self {
            client,
            message: Arc::new(message),
            binary: binary.into(),
            answered: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Client that sent the request.
    #[must_use]
    pub fn client(&self) -> &ClientRef {
        &self.client
    }

    /// Full envelope.
    #[must_use]
    pub fn message(&self) -> &RequestMessage {
        &self.message
    }

    /// Request id.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.message.id
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.message.method
    }

    /// Method parameters.
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.message.params
    }

    /// Binary tail received with the request.
    #[must_use]
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Whether the request expects no reply.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.message.id.is_empty()
    }

    /// Whether a reply or error has already been sent.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answered.load(Ordering::SeqCst)
    }

    /// Whether the client left; nothing is sent once this is set.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops every clone from writing to the client.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Deserializes the params into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRpcError::InvalidParams`] when the params do not match
    /// the expected shape.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, JsonRpcError> {
        serde_json::from_value(self.message.params.clone())
            .map_err(|error| JsonRpcError::invalid_params(error.to_string()))
    }

    /// Sends a successful result.
    pub fn reply(&self, result: impl Serialize) {
        let result = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(error) => {
                self.error(&JsonRpcError::internal(format!(
                    "Failed to serialize result: {error}"
                )));
                return;
            }
        };
        self.answer(|id| serde_json::to_string(&ReplyMessage::new(id, &result)));
    }

    /// Sends an error.
    pub fn error(&self, error: &JsonRpcError) {
        self.answer(|id| serde_json::to_string(&ErrorMessage::new(id, error)));
    }

    /// Pushes a progress update; may be called any number of times before
    /// the reply.
    pub fn progress(&self, operation: &str, amount: f64) {
        if self.is_notification() || self.is_closed() || self.is_answered() {
            return;
        }
        match serde_json::to_string(&ProgressMessage::new(self.id(), operation, amount)) {
            Ok(text) => self.send(&text),
            Err(error) => warn!(target: REQUEST_TARGET, %error, "failed to encode progress"),
        }
    }

    fn answer(&self, encode: impl FnOnce(&RequestId) -> serde_json::Result<String>) {
        if self.is_notification() {
            return;
        }
        if self.is_closed() {
            debug!(
                target: REQUEST_TARGET,
                client = %self.client.id(),
                id = %self.id(),
                "client gone; reply dropped"
            );
            return;
        }
        if self.answered.swap(true, Ordering::SeqCst) {
            warn!(
                target: REQUEST_TARGET,
                client = %self.client.id(),
                id = %self.id(),
                method = self.method(),
                "request already answered; dropping extra reply"
            );
            return;
        }
        match encode(self.id()) {
            Ok(text) => self.send(&text),
            Err(error) => warn!(target: REQUEST_TARGET, %error, "failed to encode reply"),
        }
    }

    fn send(&self, text: &str) {
        debug!(
            target: REQUEST_TARGET,
            client = %self.client.id(),
            id = %self.id(),
            bytes = text.len(),
            "sending message"
        );
        if let Err(error) = self.client.send_text(text) {
            warn!(
                target: REQUEST_TARGET,
                client = %self.client.id(),
                %error,
                "failed to deliver message"
            );
        }
    }
}
