//! Turns buffered network events into tasks.
//!
//! The [`TaskDispatcher`] runs on the dispatch thread. For each exchanged
//! [`NetworkBuffer`] it logs new connections, parses and routes every request
//! in arrival order, and finally propagates disconnections to the
//! [`TaskManager`]. Requests that fail parsing, or name an unknown method,
//! are answered directly and never become tasks.
//!
//! Two methods are handled by the dispatcher itself because they act on the
//! task queue or the registry rather than on the application:
//!
//! - `cancel` with params `{"id": <request id>}` cancels a task of the
//!   calling client and replies `null`;
//! - `registry` replies with the sorted list of available methods.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::{ClientRef, ClientRequest, Framing};
use crate::entrypoint::EntrypointRegistry;
use crate::jsonrpc::message::ErrorMessage;
use crate::jsonrpc::parser::split_binary_frame;
use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, RequestId, parse};
use crate::monitor::NetworkBuffer;
use crate::task::{BinaryConsumer, BinaryTask, JsonRpcTask, TaskManager};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Built-in method cancelling a queued or running task.
pub const CANCEL_METHOD: &str = "cancel";

/// Built-in method listing the available methods.
pub const REGISTRY_METHOD: &str = "registry";

/// Method names answered by the dispatcher itself.
pub const BUILTIN_METHODS: [&str; 2] = [CANCEL_METHOD, REGISTRY_METHOD];

/// Creates a registry that refuses the built-in method names.
#[must_use]
pub fn builtin_registry() -> EntrypointRegistry {
    EntrypointRegistry::with_reserved(&BUILTIN_METHODS)
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    #[serde(default)]
    id: RequestId,
}

/// Routes requests to entrypoints through the task manager.
pub struct TaskDispatcher {
    registry: EntrypointRegistry,
    binary_consumer: Option<Arc<dyn BinaryConsumer>>,
}

impl TaskDispatcher {
    /// Creates a dispatcher over the given entrypoints.
    #[must_use]
    pub fn new(registry: EntrypointRegistry) -> Self {
        Self {
            registry,
            binary_consumer: None,
        }
    }

    /// Routes raw binary chunks to `consumer`. Without one they are dropped.
    #[must_use]
    pub fn with_binary_consumer(mut self, consumer: Arc<dyn BinaryConsumer>) -> Self {
        self.binary_consumer = Some(consumer);
        self
    }

    /// Registered entrypoints.
    #[must_use]
    pub fn registry(&self) -> &EntrypointRegistry {
        &self.registry
    }

    /// Processes one exchanged buffer.
    pub fn dispatch(&self, buffer: NetworkBuffer, tasks: &mut TaskManager) {
        let NetworkBuffer {
            connected_clients,
            disconnected_clients,
            requests,
        } = buffer;

        for client in &connected_clients {
            info!(target: DISPATCH_TARGET, client = %client.id(), "client connected");
        }
        for request in requests {
            self.dispatch_request(request, tasks);
        }
        for client in &disconnected_clients {
            info!(target: DISPATCH_TARGET, client = %client.id(), "client disconnected");
            tasks.disconnect(client);
        }
    }

    fn dispatch_request(&self, request: ClientRequest, tasks: &mut TaskManager) {
        let (client, payload, framing) = request.into_parts();

        if framing == Framing::Binary {
            match split_binary_frame(&payload) {
                Ok(frame) if frame.is_raw_chunk() => {
                    self.dispatch_binary(client, frame.tail.to_vec(), tasks);
                    return;
                }
                Ok(_) => {}
                Err(error) => {
                    reject(&client, &RequestId::Absent, &error);
                    return;
                }
            }
        }

        let envelope = match parse(&payload, framing) {
            Ok(envelope) => envelope,
            Err(rejected) => {
                reject(&client, &rejected.id, &rejected.error);
                return;
            }
        };

        let request = JsonRpcRequest::new(client, envelope.message, envelope.binary);
        debug!(
            target: DISPATCH_TARGET,
            client = %request.client().id(),
            id = %request.id(),
            method = request.method(),
            "dispatching request"
        );

        match request.method() {
            CANCEL_METHOD => cancel(&request, tasks),
            REGISTRY_METHOD => request.reply(self.method_names()),
            method => match self.registry.find(method) {
                Some(entrypoint) => tasks.add(Box::new(JsonRpcTask::new(request, entrypoint))),
                None => {
                    warn!(
                        target: DISPATCH_TARGET,
                        client = %request.client().id(),
                        method,
                        "unknown method"
                    );
                    request.error(&JsonRpcError::method_not_found(method));
                }
            },
        }
    }

    fn dispatch_binary(&self, client: ClientRef, data: Vec<u8>, tasks: &mut TaskManager) {
        let Some(consumer) = &self.binary_consumer else {
            warn!(
                target: DISPATCH_TARGET,
                client = %client.id(),
                bytes = data.len(),
                "dropping binary chunk; no consumer installed"
            );
            return;
        };
        tasks.add(Box::new(BinaryTask::new(client, data, Arc::clone(consumer))));
    }

    fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .registry
            .methods()
            .chain(BUILTIN_METHODS)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TaskDispatcher")
            .field("registry", &self.registry)
            .field("binary_consumer", &self.binary_consumer.is_some())
            .finish()
    }
}

fn cancel(request: &JsonRpcRequest, tasks: &mut TaskManager) {
    let outcome = request
        .params_as::<CancelParams>()
        .and_then(|params| tasks.cancel(request.client(), &params.id));
    match outcome {
        Ok(()) => request.reply(()),
        Err(error) => request.error(&error),
    }
}

/// Answers a request that never became a task.
fn reject(client: &ClientRef, id: &RequestId, error: &JsonRpcError) {
    warn!(
        target: DISPATCH_TARGET,
        client = %client.id(),
        %id,
        code = error.code(),
        %error,
        "rejected request"
    );
    let text = match serde_json::to_string(&ErrorMessage::new(id, error)) {
        Ok(text) => text,
        Err(encode_error) => {
            warn!(target: DISPATCH_TARGET, error = %encode_error, "failed to encode rejection");
            return;
        }
    };
    if let Err(send_error) = client.send_text(&text) {
        warn!(
            target: DISPATCH_TARGET,
            client = %client.id(),
            error = %send_error,
            "failed to deliver rejection"
        );
    }
}
