//! Task running one JSON-RPC request through its entrypoint.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::ClientRef;
use crate::entrypoint::Entrypoint;
use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, RequestId};

use super::{TASK_TARGET, Task, panic_message};

/// State machine around a single request.
///
/// `Created → Cancelled | Disconnected | Running → (Completed | Cancelled)`.
/// A disconnected task never replies; a task cancelled before running
/// replies with [`JsonRpcError::TaskCancelled`] instead of calling the
/// entrypoint.
pub struct JsonRpcTask {
    request: JsonRpcRequest,
    entrypoint: Arc<dyn Entrypoint>,
    running: bool,
    cancelled: bool,
    disconnected: bool,
}

impl JsonRpcTask {
    /// Binds a request to the entrypoint that will handle it.
    #[must_use]
    pub fn new(request: JsonRpcRequest, entrypoint: Arc<dyn Entrypoint>) -> Self {
        Self {
            request,
            entrypoint,
            running: false,
            cancelled: false,
            disconnected: false,
        }
    }

    /// Request handled by the task.
    #[must_use]
    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    /// Whether the entrypoint has been invoked.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the owning client has left.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn invoke(&self) -> Result<(), JsonRpcError> {
        let entrypoint = &self.entrypoint;
        let request = &self.request;
        match panic::catch_unwind(AssertUnwindSafe(|| entrypoint.on_request(request))) {
            Ok(result) => result.map_err(crate::entrypoint::EntrypointError::into_rpc),
            Err(payload) => Err(JsonRpcError::internal(format!(
                "Entrypoint panicked: {}",
                panic_message(&*payload)
            ))),
        }
    }
}

impl fmt::Debug for JsonRpcTask {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("JsonRpcTask")
            .field("client", self.request.client())
            .field("id", self.request.id())
            .field("method", &self.request.method())
            .field("running", &self.running)
            .field("cancelled", &self.cancelled)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

impl Task for JsonRpcTask {
    fn client(&self) -> &ClientRef {
        self.request.client()
    }

    fn id(&self) -> &RequestId {
        self.request.id()
    }

    fn method(&self) -> &str {
        self.request.method()
    }

    fn has_priority(&self) -> bool {
        self.entrypoint.has_priority()
    }

    fn run(&mut self) {
        if self.disconnected {
            debug!(
                target: TASK_TARGET,
                client = %self.client().id(),
                method = self.method(),
                "skipping task of disconnected client"
            );
            return;
        }
        if self.cancelled {
            self.request.error(&JsonRpcError::TaskCancelled);
            return;
        }
        if self.running {
            return;
        }

        self.running = true;
        debug!(
            target: TASK_TARGET,
            client = %self.client().id(),
            id = %self.id(),
            method = self.method(),
            "running task"
        );
        if let Err(error) = self.invoke() {
            warn!(
                target: TASK_TARGET,
                client = %self.client().id(),
                id = %self.id(),
                method = self.method(),
                code = error.code(),
                %error,
                "task failed"
            );
            self.request.error(&error);
        }
    }

    fn cancel(&mut self) -> Result<(), JsonRpcError> {
        if !self.entrypoint.is_async() {
            return Err(JsonRpcError::invalid_params(format!(
                "Method '{}' cannot be cancelled",
                self.method()
            )));
        }
        if self.cancelled {
            return Err(JsonRpcError::invalid_params(format!(
                "Task {} is already cancelled",
                self.id()
            )));
        }
        if self.running {
            self.entrypoint.on_cancel();
        }
        self.cancelled = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.request.close();
        if let Err(error) = self.entrypoint.on_disconnect() {
            warn!(
                target: TASK_TARGET,
                client = %self.client().id(),
                method = self.method(),
                %error,
                "entrypoint disconnect hook failed"
            );
        }
        self.disconnected = true;
    }

    fn is_pending(&self) -> bool {
        self.running
            && !self.disconnected
            && self.entrypoint.is_async()
            && !self.request.is_notification()
            && !self.request.is_answered()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::entrypoint::EntrypointError;
    use crate::jsonrpc::RequestMessage;
    use crate::jsonrpc::errors::{INTERNAL_ERROR, INVALID_PARAMS, TASK_CANCELLED};
    use crate::test_support::{HookedEntrypoint, MockHooks, RecordingSender, test_client};

    struct Harness {
        sender: Arc<RecordingSender>,
        request: JsonRpcRequest,
    }

    impl Harness {
        fn task(&self, hooks: MockHooks) -> JsonRpcTask {
            JsonRpcTask::new(
                self.request.clone(),
                HookedEntrypoint::shared("render", hooks),
            )
        }

        fn error_codes(&self) -> Vec<i64> {
            self.sender
                .messages()
                .iter()
                .filter_map(|message| message["error"]["code"].as_i64())
                .collect()
        }
    }

    fn harness_with_id(id: RequestId) -> Harness {
        let (client, sender) = test_client(1);
        let message = RequestMessage::new("render", json!({}), id);
        Harness {
            sender,
            request: JsonRpcRequest::new(client, message, Vec::new()),
        }
    }

    #[fixture]
    fn harness() -> Harness {
        harness_with_id(RequestId::Integer(7))
    }

    struct PanickingEntrypoint;

    impl Entrypoint for PanickingEntrypoint {
        fn method(&self) -> &str {
            "render"
        }

        fn on_request(&self, _: &JsonRpcRequest) -> Result<(), EntrypointError> {
            panic!("renderer exploded");
        }
    }

    #[rstest]
    fn run_invokes_entrypoint(harness: Harness) {
        let mut hooks = MockHooks::with_flags(false, false);
        hooks.expect_on_request().times(1).returning(|request| {
            request.reply(json!({"frame": 1}));
            Ok(())
        });

        let mut task = harness.task(hooks);
        task.run();

        assert!(task.is_running());
        assert!(!task.is_pending());
        assert_eq!(harness.sender.messages()[0]["result"], json!({"frame": 1}));
    }

    #[rstest]
    #[case::rpc(|| JsonRpcError::invalid_params("bad width").into(), INVALID_PARAMS)]
    #[case::schema(|| EntrypointError::Schema(Vec::new()), INVALID_PARAMS)]
    #[case::other(|| anyhow::anyhow!("gpu lost").into(), INTERNAL_ERROR)]
    fn run_translates_entrypoint_errors(
        harness: Harness,
        #[case] failure: fn() -> EntrypointError,
        #[case] code: i64,
    ) {
        let mut hooks = MockHooks::with_flags(false, false);
        hooks
            .expect_on_request()
            .times(1)
            .returning(move |_| Err(failure()));

        let mut task = harness.task(hooks);
        task.run();

        assert_eq!(harness.error_codes(), vec![code]);
    }

    #[rstest]
    fn run_converts_panics_to_internal_errors(harness: Harness) {
        let mut task = JsonRpcTask::new(harness.request.clone(), Arc::new(PanickingEntrypoint));
        task.run();

        let messages = harness.sender.messages();
        assert_eq!(messages[0]["error"]["code"], INTERNAL_ERROR);
        assert!(
            messages[0]["error"]["message"]
                .as_str()
                .is_some_and(|message| message.contains("renderer exploded"))
        );
    }

    #[rstest]
    fn run_happens_at_most_once(harness: Harness) {
        let mut hooks = MockHooks::with_flags(false, false);
        hooks.expect_on_request().times(1).returning(|_| Ok(()));

        let mut task = harness.task(hooks);
        task.run();
        task.run();
    }

    #[rstest]
    fn cancel_before_run_replies_task_cancelled(harness: Harness) {
        let mut hooks = MockHooks::with_flags(true, false);
        hooks.expect_on_request().never();
        hooks.expect_on_cancel().never();

        let mut task = harness.task(hooks);
        task.cancel().expect("cancel queued task");
        task.run();

        assert_eq!(harness.error_codes(), vec![TASK_CANCELLED]);
    }

    #[rstest]
    fn cancel_while_running_forwards_to_entrypoint(harness: Harness) {
        let mut hooks = MockHooks::with_flags(true, false);
        hooks.expect_on_request().times(1).returning(|_| Ok(()));
        hooks.expect_on_cancel().times(1).return_const(());

        let mut task = harness.task(hooks);
        task.run();
        assert!(task.is_pending());
        task.cancel().expect("cancel running task");
        assert!(task.is_cancelled());
    }

    #[rstest]
    fn cancel_twice_fails(harness: Harness) {
        let mut task = harness.task(MockHooks::with_flags(true, false));
        task.cancel().expect("first cancel");
        let error = task.cancel().expect_err("second cancel");
        assert_eq!(error.code(), INVALID_PARAMS);
    }

    #[rstest]
    fn cancel_requires_async_entrypoint(harness: Harness) {
        let mut task = harness.task(MockHooks::with_flags(false, false));
        let error = task.cancel().expect_err("sync entrypoint");
        assert_eq!(error.code(), INVALID_PARAMS);
        assert!(!task.is_cancelled());
    }

    #[rstest]
    fn disconnected_task_runs_silently(harness: Harness) {
        let mut hooks = MockHooks::with_flags(false, false);
        hooks.expect_on_disconnect().times(1).returning(|| Ok(()));
        hooks.expect_on_request().never();

        let mut task = harness.task(hooks);
        task.disconnect();
        task.disconnect();
        task.run();

        assert!(harness.sender.messages().is_empty());
    }

    #[rstest]
    fn disconnect_silences_in_flight_async_work(harness: Harness) {
        let held: Arc<std::sync::Mutex<Option<JsonRpcRequest>>> = Arc::default();
        let stash = Arc::clone(&held);
        let mut hooks = MockHooks::with_flags(true, false);
        hooks.expect_on_request().times(1).returning(move |request| {
            *stash.lock().expect("stash lock") = Some(request.clone());
            Ok(())
        });
        hooks.expect_on_disconnect().times(1).returning(|| Ok(()));

        let mut task = harness.task(hooks);
        task.run();
        task.disconnect();

        let worker_copy = held.lock().expect("held lock").take().expect("request kept");
        worker_copy.progress("render", 0.5);
        worker_copy.error(&JsonRpcError::TaskCancelled);

        assert!(!task.is_pending());
        assert!(harness.sender.messages().is_empty());
    }

    #[rstest]
    fn disconnect_hook_failures_are_not_propagated(harness: Harness) {
        let mut hooks = MockHooks::with_flags(false, false);
        hooks
            .expect_on_disconnect()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("cleanup failed").into()));

        let mut task = harness.task(hooks);
        task.disconnect();
        assert!(task.is_disconnected());
    }

    #[test]
    fn notifications_are_never_answered() {
        let harness = harness_with_id(RequestId::Absent);
        let mut hooks = MockHooks::with_flags(false, false);
        hooks.expect_on_request().times(1).returning(|request| {
            request.reply(json!({}));
            Ok(())
        });

        let mut task = harness.task(hooks);
        task.run();

        assert!(harness.sender.messages().is_empty());
    }
}
