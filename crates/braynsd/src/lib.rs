//! Request dispatch and task lifecycle for the Brayns network daemon.
//!
//! Transport threads report connections, raw requests and disconnections to
//! a shared [`NetworkMonitor`]. A single dispatch thread drives a
//! [`NetworkService`], which exchanges the monitor buffer, parses each
//! request into a [`JsonRpcRequest`], routes it through a [`TaskDispatcher`]
//! to its [`Entrypoint`], and drains the [`TaskManager`]. Replies, errors
//! and progress updates flow back through the request to the originating
//! client.
//!
//! Long-running entrypoints report themselves as asynchronous, run their
//! body on a [`NetworkTask`] worker, and may be cancelled by clients through
//! the built-in `cancel` method.
//!
//! The [`transport`] module provides a TCP/Unix socket front end and
//! [`daemon`] ties everything to a configured endpoint.

mod client;
pub mod daemon;
mod dispatch;
mod entrypoint;
pub mod jsonrpc;
mod monitor;
mod network_task;
mod service;
pub mod task;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use client::{ClientId, ClientRef, ClientRequest, ClientSender, Framing, SendError};
pub use daemon::{Daemon, DaemonError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use dispatch::{BUILTIN_METHODS, CANCEL_METHOD, REGISTRY_METHOD, TaskDispatcher, builtin_registry};
pub use entrypoint::{Entrypoint, EntrypointError, EntrypointRegistry, RegistryError};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, RequestId, RequestMessage, ValidationError};
pub use monitor::{NetworkBuffer, NetworkMonitor};
pub use network_task::{NetworkTask, NetworkTaskHandler, NetworkTaskState, TaskProgress};
pub use service::NetworkService;
pub use task::{BinaryConsumer, BinaryTask, JsonRpcTask, Task, TaskManager};
pub use telemetry::{TelemetryError, TelemetryHandle};
