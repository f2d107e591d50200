//! Units of work created from dispatched requests.
//!
//! A [`Task`] is owned by the [`TaskManager`] from the moment it is added
//! until it has run (and, for asynchronous work, until its request has been
//! answered). All state transitions happen on the dispatch thread.

mod binary_task;
mod jsonrpc_task;
mod manager;

use std::any::Any;

use crate::client::ClientRef;
use crate::jsonrpc::{JsonRpcError, RequestId};

pub use self::binary_task::{BinaryConsumer, BinaryTask};
pub use self::jsonrpc_task::JsonRpcTask;
pub use self::manager::TaskManager;

const TASK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::task");

/// A tracked, cancellable unit of work.
pub trait Task: Send {
    /// Client that submitted the work.
    fn client(&self) -> &ClientRef;

    /// Id of the originating request.
    fn id(&self) -> &RequestId;

    /// Method of the originating request.
    fn method(&self) -> &str;

    /// Whether the task runs immediately when added.
    fn has_priority(&self) -> bool;

    /// Executes the task. The manager calls this at most once.
    fn run(&mut self);

    /// Requests cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRpcError`] when the task cannot be cancelled.
    fn cancel(&mut self) -> Result<(), JsonRpcError>;

    /// Marks the owning client as gone.
    fn disconnect(&mut self);

    /// Whether the task has run but its asynchronous work is still in
    /// flight, so it must stay reachable for cancellation and disconnects.
    fn is_pending(&self) -> bool {
        false
    }
}

/// Whether a task belongs to `client` and answers request `id`.
fn matches(task: &dyn Task, client: &ClientRef, id: &RequestId) -> bool {
    task.client() == client && task.id() == id
}

/// Describes a panic payload caught at a thread or unwind boundary.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
        .to_owned()
}
