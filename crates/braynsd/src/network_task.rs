//! Cancellable background work for long-running entrypoints.
//!
//! An asynchronous entrypoint owns a [`NetworkTask`], starts it from
//! `on_request`, and polls it from `on_update` so the outcome callbacks run
//! on the dispatch thread. The body runs on a dedicated worker thread and
//! observes cancellation only at [`TaskProgress::progress`] checkpoints.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::jsonrpc::JsonRpcError;
use crate::task::panic_message;

const NETWORK_TASK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::network_task");

/// Lifecycle of a [`NetworkTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTaskState {
    /// Never started.
    Idle,
    /// A body is in flight or finished without its outcome being collected.
    Running,
    /// The last body succeeded.
    Completed,
    /// The last run was cancelled.
    Cancelled,
    /// The last body failed.
    Errored,
}

/// Callbacks and body of a background operation.
///
/// `run` and `on_progress` execute on the worker thread; every other hook
/// runs on the thread driving the [`NetworkTask`].
pub trait NetworkTaskHandler: Send + Sync + 'static {
    /// Called synchronously by [`NetworkTask::start`] before the body is
    /// launched.
    fn on_start(&self) {}

    /// The work itself.
    ///
    /// # Errors
    ///
    /// Errors are captured and redelivered to [`Self::on_error`] when the
    /// outcome is collected. Propagating the error returned by
    /// [`TaskProgress::progress`] is how the body honours cancellation.
    fn run(&self, progress: &TaskProgress<'_>) -> Result<(), JsonRpcError>;

    /// The body finished successfully and the task was not cancelled.
    fn on_complete(&self) {}

    /// The body failed, or the task was cancelled.
    fn on_error(&self, error: &JsonRpcError) {
        let _ = error;
    }

    /// Cancellation was requested while the body was running.
    fn on_cancel(&self) {}

    /// The body reported progress.
    fn on_progress(&self, operation: &str, amount: f64) {
        let _ = (operation, amount);
    }
}

/// Checkpoint handle passed to the body.
pub struct TaskProgress<'a> {
    cancelled: &'a AtomicBool,
    handler: &'a dyn NetworkTaskHandler,
}

impl TaskProgress<'_> {
    /// Reports progress, or fails when cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRpcError::TaskCancelled`] once the task is cancelled.
    pub fn progress(&self, operation: &str, amount: f64) -> Result<(), JsonRpcError> {
        if self.is_cancelled() {
            return Err(JsonRpcError::TaskCancelled);
        }
        self.handler.on_progress(operation, amount);
        Ok(())
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to at most one in-flight execution of a handler's body.
pub struct NetworkTask<H: NetworkTaskHandler> {
    handler: Arc<H>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<(), JsonRpcError>>>,
    state: NetworkTaskState,
}

impl<H: NetworkTaskHandler> NetworkTask<H> {
    /// Wraps a handler; nothing runs until [`Self::start`].
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            cancelled: Arc::new(AtomicBool::new(false)),
            worker: None,
            state: NetworkTaskState::Idle,
        }
    }

    /// Handler shared with the worker thread.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NetworkTaskState {
        self.state
    }

    /// Whether a body is in flight or its outcome is uncollected.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Launches the body on a new worker thread.
    ///
    /// A previous execution still in flight is cancelled and waited for
    /// first, so its outcome callbacks fire before `on_start`.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRpcError::InternalError`] when the worker thread cannot
    /// be spawned; `on_error` has then fired and the state is
    /// [`NetworkTaskState::Errored`].
    pub fn start(&mut self) -> Result<(), JsonRpcError> {
        if self.is_running() {
            debug!(target: NETWORK_TASK_TARGET, "restarting in-flight task");
            self.cancel();
            self.wait();
        }
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.handler.on_start();

        let handler = Arc::clone(&self.handler);
        let cancelled = Arc::clone(&self.cancelled);
        let spawned = thread::Builder::new()
            .name("brayns-network-task".to_owned())
            .spawn(move || {
                let progress = TaskProgress {
                    cancelled: &*cancelled,
                    handler: &*handler,
                };
                handler.run(&progress)
            });
        self.attach(spawned)
    }

    fn attach(
        &mut self,
        spawned: io::Result<JoinHandle<Result<(), JsonRpcError>>>,
    ) -> Result<(), JsonRpcError> {
        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                self.state = NetworkTaskState::Running;
                Ok(())
            }
            Err(error) => {
                let error = JsonRpcError::internal(format!(
                    "Failed to spawn worker thread: {error}"
                ));
                self.state = NetworkTaskState::Errored;
                self.handler.on_error(&error);
                Err(error)
            }
        }
    }

    /// Delivers the outcome if the body has finished, without blocking.
    ///
    /// Returns `true` when an outcome callback fired.
    pub fn poll(&mut self) -> bool {
        if !self
            .worker
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
        {
            return false;
        }
        self.wait()
    }

    /// Blocks until the body finishes, then delivers the outcome.
    ///
    /// Returns `true` when an outcome callback fired.
    pub fn wait(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        let outcome = worker.join().unwrap_or_else(|payload| {
            Err(JsonRpcError::internal(format!(
                "Task body panicked: {}",
                panic_message(&*payload)
            )))
        });
        self.deliver(outcome);
        true
    }

    /// Requests cancellation of the running body.
    ///
    /// Returns `false` when nothing is running or cancellation was already
    /// requested. The body keeps running until its next checkpoint.
    pub fn cancel(&mut self) -> bool {
        if !self.is_running() || self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        self.handler.on_cancel();
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    fn deliver(&mut self, outcome: Result<(), JsonRpcError>) {
        if self.cancelled.load(Ordering::SeqCst) {
            self.state = NetworkTaskState::Cancelled;
            self.handler.on_error(&JsonRpcError::TaskCancelled);
            return;
        }
        match outcome {
            Ok(()) => {
                self.state = NetworkTaskState::Completed;
                self.handler.on_complete();
            }
            Err(error) => {
                debug!(target: NETWORK_TASK_TARGET, %error, "task body failed");
                self.state = NetworkTaskState::Errored;
                self.handler.on_error(&error);
            }
        }
    }
}

// The owner of a run always hears its outcome, even when it discards the
// handle mid-flight.
impl<H: NetworkTaskHandler> Drop for NetworkTask<H> {
    fn drop(&mut self) {
        if self.is_running() {
            debug!(target: NETWORK_TASK_TARGET, "dropping running task; settling it first");
            self.cancel();
            self.wait();
        }
    }
}

impl<H: NetworkTaskHandler> std::fmt::Debug for NetworkTask<H> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("NetworkTask")
            .field("state", &self.state)
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
