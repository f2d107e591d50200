//! Shared test doubles for unit tests.

use std::sync::{Arc, Mutex};

use mockall::mock;
use serde_json::Value;

use crate::client::{ClientId, ClientRef, ClientSender, SendError};
use crate::entrypoint::{Entrypoint, EntrypointError};
use crate::jsonrpc::JsonRpcRequest;

/// Sender that stores every message it is asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
}

impl RecordingSender {
    /// Messages sent so far, decoded as JSON.
    pub fn messages(&self) -> Vec<Value> {
        self.raw()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent message is JSON"))
            .collect()
    }

    /// Messages sent so far, as written.
    pub fn raw(&self) -> Vec<String> {
        self.sent.lock().expect("sender lock").clone()
    }
}

impl ClientSender for RecordingSender {
    fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.sent.lock().expect("sender lock").push(text.to_owned());
        Ok(())
    }
}

/// Builds a client backed by a [`RecordingSender`].
pub fn test_client(raw: u64) -> (ClientRef, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let client = ClientRef::new(ClientId::new(raw), sender.clone());
    (client, sender)
}

/// Behaviour of an entrypoint without its method name, so it can be mocked.
pub trait EntrypointHooks: Send + Sync {
    fn has_priority(&self) -> bool;
    fn is_async(&self) -> bool;
    fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError>;
    fn on_cancel(&self);
    fn on_disconnect(&self) -> Result<(), EntrypointError>;
    fn on_update(&self);
}

mock! {
    pub Hooks {}
    impl EntrypointHooks for Hooks {
        fn has_priority(&self) -> bool;
        fn is_async(&self) -> bool;
        fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError>;
        fn on_cancel(&self);
        fn on_disconnect(&self) -> Result<(), EntrypointError>;
        fn on_update(&self);
    }
}

impl MockHooks {
    /// Hooks answering the flag queries, with no other expectations yet.
    pub fn with_flags(is_async: bool, has_priority: bool) -> Self {
        let mut hooks = Self::new();
        hooks.expect_is_async().return_const(is_async);
        hooks.expect_has_priority().return_const(has_priority);
        hooks
    }
}

/// Entrypoint delegating everything but its name to mocked hooks.
pub struct HookedEntrypoint<H = MockHooks> {
    method: String,
    hooks: H,
}

impl<H: EntrypointHooks> HookedEntrypoint<H> {
    pub fn new(method: &str, hooks: H) -> Self {
        Self {
            method: method.to_owned(),
            hooks,
        }
    }

    pub fn shared(method: &str, hooks: H) -> Arc<dyn Entrypoint>
    where
        H: 'static,
    {
        Arc::new(Self::new(method, hooks))
    }
}

impl<H: EntrypointHooks> Entrypoint for HookedEntrypoint<H> {
    fn method(&self) -> &str {
        &self.method
    }

    fn has_priority(&self) -> bool {
        self.hooks.has_priority()
    }

    fn is_async(&self) -> bool {
        self.hooks.is_async()
    }

    fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError> {
        self.hooks.on_request(request)
    }

    fn on_cancel(&self) {
        self.hooks.on_cancel();
    }

    fn on_disconnect(&self) -> Result<(), EntrypointError> {
        self.hooks.on_disconnect()
    }

    fn on_update(&self) {
        self.hooks.on_update();
    }
}

/// Synchronous entrypoint replying with its params.
pub struct EchoEntrypoint;

impl Entrypoint for EchoEntrypoint {
    fn method(&self) -> &str {
        "echo"
    }

    fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError> {
        request.reply(request.params());
        Ok(())
    }
}
