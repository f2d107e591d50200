//! FIFO queue of tasks owned by the dispatch thread.

use std::collections::VecDeque;

use tracing::debug;

use crate::client::ClientRef;
use crate::jsonrpc::{JsonRpcError, RequestId};

use super::{TASK_TARGET, Task, matches};

/// Queue of tasks awaiting execution, plus asynchronous tasks that have run
/// but not yet answered.
///
/// Priority tasks run inside [`TaskManager::add`]; everything else waits
/// until [`TaskManager::run_all_tasks`]. Both lists are reachable by
/// [`TaskManager::cancel`] and [`TaskManager::disconnect`], so a client can
/// stop a long render it started earlier.
#[derive(Default)]
pub struct TaskManager {
    queue: VecDeque<Box<dyn Task>>,
    pending: Vec<Box<dyn Task>>,
}

impl TaskManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the task now if it has priority, otherwise queues it.
    pub fn add(&mut self, mut task: Box<dyn Task>) {
        if task.has_priority() {
            debug!(
                target: TASK_TARGET,
                client = %task.client().id(),
                method = task.method(),
                "running priority task"
            );
            task.run();
            self.retain_if_pending(task);
            return;
        }
        debug!(
            target: TASK_TARGET,
            client = %task.client().id(),
            method = task.method(),
            queued = self.queue.len() + 1,
            "queued task"
        );
        self.queue.push_back(task);
    }

    /// Runs queued tasks in FIFO order until the queue is empty, including
    /// tasks added while draining.
    pub fn run_all_tasks(&mut self) {
        while let Some(mut task) = self.queue.pop_front() {
            task.run();
            self.retain_if_pending(task);
        }
        self.prune();
    }

    /// Marks every task of `client` as disconnected. Queued tasks stay in
    /// the queue and are discarded silently when they run.
    pub fn disconnect(&mut self, client: &ClientRef) {
        let mut count = 0_usize;
        for task in self.queue.iter_mut().chain(self.pending.iter_mut()) {
            if task.client() == client {
                task.disconnect();
                count += 1;
            }
        }
        self.prune();
        debug!(
            target: TASK_TARGET,
            client = %client.id(),
            tasks = count,
            "client tasks disconnected"
        );
    }

    /// Cancels the task of `client` answering request `id`.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRpcError::InvalidParams`] for an empty id or when no
    /// task matches, or the error raised by the task itself.
    pub fn cancel(&mut self, client: &ClientRef, id: &RequestId) -> Result<(), JsonRpcError> {
        if id.is_empty() {
            return Err(JsonRpcError::invalid_params("Cannot cancel a task without id"));
        }
        self.prune();
        let task = self
            .queue
            .iter_mut()
            .chain(self.pending.iter_mut())
            .map(|task| &mut **task)
            .find(|task| matches(&**task, client, id))
            .ok_or_else(|| JsonRpcError::invalid_params(format!("No task found with id {id}")))?;
        task.cancel()?;
        debug!(
            target: TASK_TARGET,
            client = %client.id(),
            %id,
            "task cancelled"
        );
        Ok(())
    }

    /// Drops every queued and pending task without running it.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether any asynchronous task is still waiting for its reply.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(|task| task.is_pending())
    }

    fn retain_if_pending(&mut self, task: Box<dyn Task>) {
        if task.is_pending() {
            self.pending.push(task);
        }
    }

    fn prune(&mut self) {
        self.pending.retain(|task| task.is_pending());
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TaskManager")
            .field("queued", &self.queue.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
