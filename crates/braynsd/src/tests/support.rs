//! Entrypoints and worlds shared by the behavioural suites.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::client::{ClientRef, ClientRequest};
use crate::dispatch::{TaskDispatcher, builtin_registry};
use crate::entrypoint::{Entrypoint, EntrypointError};
use crate::jsonrpc::{JsonRpcError, JsonRpcRequest};
use crate::monitor::NetworkMonitor;
use crate::network_task::{NetworkTask, NetworkTaskHandler, TaskProgress};
use crate::service::NetworkService;
use crate::test_support::{EchoEntrypoint, RecordingSender, test_client};

/// One-shot latch holding render bodies until a step releases them.
#[derive(Debug, Default)]
pub(super) struct Gate {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Gate {
    pub(super) fn release(&self) {
        *self.open.lock().expect("gate lock") = true;
        self.signal.notify_all();
    }

    /// Holds the body until release, giving up once it is cancelled.
    fn pass(&self, progress: &TaskProgress<'_>) -> Result<(), JsonRpcError> {
        let mut open = self.open.lock().expect("gate lock");
        while !*open {
            if progress.is_cancelled() {
                return Err(JsonRpcError::TaskCancelled);
            }
            open = self
                .signal
                .wait_timeout(open, Duration::from_millis(5))
                .expect("gate wait")
                .0;
        }
        Ok(())
    }
}

/// Render body shared by every request of the entrypoint.
///
/// `next` is taken over by `on_start`, so the request of a run being
/// replaced still receives that run's outcome.
struct RenderJob {
    gate: Arc<Gate>,
    next: Mutex<Option<JsonRpcRequest>>,
    active: Mutex<Option<JsonRpcRequest>>,
}

impl RenderJob {
    fn with_active(&self, action: impl FnOnce(&JsonRpcRequest)) {
        if let Some(request) = self.active.lock().expect("active lock").as_ref() {
            action(request);
        }
    }
}

impl NetworkTaskHandler for RenderJob {
    fn on_start(&self) {
        let next = self.next.lock().expect("next lock").take();
        *self.active.lock().expect("active lock") = next;
    }

    fn run(&self, progress: &TaskProgress<'_>) -> Result<(), JsonRpcError> {
        self.gate.pass(progress)?;
        progress.progress("render", 0.5)?;
        progress.progress("render", 1.0)
    }

    fn on_complete(&self) {
        self.with_active(|request| request.reply(json!({"frames": 1})));
    }

    fn on_error(&self, error: &JsonRpcError) {
        self.with_active(|request| request.error(error));
    }

    fn on_progress(&self, operation: &str, amount: f64) {
        self.with_active(|request| request.progress(operation, amount));
    }
}

/// Asynchronous entrypoint rendering on a single reused [`NetworkTask`].
pub(super) struct RenderEntrypoint {
    job: Mutex<NetworkTask<RenderJob>>,
}

impl RenderEntrypoint {
    pub(super) fn new(gate: Arc<Gate>) -> Self {
        Self {
            job: Mutex::new(NetworkTask::new(RenderJob {
                gate,
                next: Mutex::new(None),
                active: Mutex::new(None),
            })),
        }
    }

    /// Whether a render body is in flight or its outcome is uncollected.
    pub(super) fn is_busy(&self) -> bool {
        self.job.lock().expect("job lock").is_running()
    }
}

impl Entrypoint for RenderEntrypoint {
    fn method(&self) -> &str {
        "render"
    }

    fn is_async(&self) -> bool {
        true
    }

    fn on_request(&self, request: &JsonRpcRequest) -> Result<(), EntrypointError> {
        let mut job = self.job.lock().expect("job lock");
        *job.handler().next.lock().expect("next lock") = Some(request.clone());
        job.start()?;
        Ok(())
    }

    fn on_cancel(&self) {
        self.job.lock().expect("job lock").cancel();
    }

    fn on_disconnect(&self) -> Result<(), EntrypointError> {
        self.on_cancel();
        Ok(())
    }

    fn on_update(&self) {
        self.job.lock().expect("job lock").poll();
    }
}

/// In-process service with one recorded client.
pub(super) struct ServiceWorld {
    pub(super) service: NetworkService,
    pub(super) client: ClientRef,
    pub(super) sender: Arc<RecordingSender>,
    pub(super) gate: Arc<Gate>,
    render: Arc<RenderEntrypoint>,
}

impl ServiceWorld {
    pub(super) fn new() -> Self {
        let gate = Arc::new(Gate::default());
        let render = Arc::new(RenderEntrypoint::new(Arc::clone(&gate)));
        let mut registry = builtin_registry();
        registry.add(Arc::new(EchoEntrypoint)).expect("register echo");
        registry
            .add(Arc::clone(&render) as Arc<dyn Entrypoint>)
            .expect("register render");
        let (client, sender) = test_client(1);
        Self {
            service: NetworkService::new(
                Arc::new(NetworkMonitor::new()),
                TaskDispatcher::new(registry),
            ),
            client,
            sender,
            gate,
            render,
        }
    }

    pub(super) fn disconnect(&mut self) {
        self.service
            .monitor()
            .notify_disconnection(self.client.clone());
        self.service.poll();
    }

    /// Polls the service until the render worker is idle and no task waits
    /// for a reply, for at most two seconds.
    pub(super) fn settle(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.render.is_busy() || self.service.has_pending_work() {
            assert!(Instant::now() < deadline, "service did not settle");
            self.service.wait_timeout(Duration::from_millis(5));
        }
    }

    pub(super) fn send(&mut self, text: &str) {
        self.service
            .monitor()
            .notify_request(ClientRequest::text(self.client.clone(), text));
        self.service.poll();
    }

    pub(super) fn messages(&self) -> Vec<Value> {
        self.sender.messages()
    }

    pub(super) fn reply_to(&self, id: i64) -> Option<Value> {
        self.messages()
            .into_iter()
            .find(|message| message["id"] == id && message.get("method").is_none())
    }

    /// Polls the service until `id` is answered or two seconds pass.
    pub(super) fn await_reply(&mut self, id: i64) -> Option<Value> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(reply) = self.reply_to(id) {
                return Some(reply);
            }
            self.service.wait_timeout(Duration::from_millis(5));
        }
        self.reply_to(id)
    }
}

impl Drop for ServiceWorld {
    fn drop(&mut self) {
        self.gate.release();
    }
}
