//! Application-side loop driving dispatch and task execution.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::dispatch::{DISPATCH_TARGET, TaskDispatcher};
use crate::monitor::{NetworkBuffer, NetworkMonitor};
use crate::task::TaskManager;

/// Owns the dispatch-thread state: the task queue and the dispatcher.
///
/// Every iteration exchanges the monitor buffer, dispatches it, drains the
/// task queue and gives each entrypoint its update tick, in that order.
#[derive(Debug)]
pub struct NetworkService {
    monitor: Arc<NetworkMonitor>,
    dispatcher: TaskDispatcher,
    tasks: TaskManager,
}

impl NetworkService {
    /// Creates a service consuming events from `monitor`.
    #[must_use]
    pub fn new(monitor: Arc<NetworkMonitor>, dispatcher: TaskDispatcher) -> Self {
        Self {
            monitor,
            dispatcher,
            tasks: TaskManager::new(),
        }
    }

    /// Monitor the transport feeds.
    #[must_use]
    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Task queue, for inspection.
    #[must_use]
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Runs one iteration without blocking.
    pub fn poll(&mut self) {
        let buffer = self.monitor.poll();
        self.process(buffer);
    }

    /// Runs one iteration, blocking until an event arrives.
    pub fn wait(&mut self) {
        let buffer = self.monitor.wait();
        self.process(buffer);
    }

    /// Runs one iteration, blocking for at most `timeout`.
    ///
    /// Entrypoints are updated even when nothing arrived, so asynchronous
    /// work keeps progressing while clients are idle.
    pub fn wait_timeout(&mut self, timeout: Duration) {
        let buffer = self.monitor.wait_timeout(timeout);
        self.process(buffer);
    }

    /// Whether queued or in-flight work remains.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.tasks.is_empty() || self.tasks.has_pending()
    }

    /// Discards buffered events and every task.
    pub fn shutdown(&mut self) {
        info!(
            target: DISPATCH_TARGET,
            queued = self.tasks.len(),
            "shutting down network service"
        );
        self.monitor.clear();
        self.tasks.clear();
    }

    fn process(&mut self, buffer: NetworkBuffer) {
        if !buffer.is_empty() {
            debug!(
                target: DISPATCH_TARGET,
                connected = buffer.connected_clients.len(),
                disconnected = buffer.disconnected_clients.len(),
                requests = buffer.requests.len(),
                "processing network buffer"
            );
            self.dispatcher.dispatch(buffer, &mut self.tasks);
        }
        self.tasks.run_all_tasks();
        self.dispatcher.registry().update();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::client::ClientRequest;
    use crate::dispatch::builtin_registry;
    use crate::test_support::{EchoEntrypoint, HookedEntrypoint, MockHooks, test_client};

    #[fixture]
    fn service() -> NetworkService {
        let mut registry = builtin_registry();
        registry.add(Arc::new(EchoEntrypoint)).expect("register echo");
        NetworkService::new(
            Arc::new(NetworkMonitor::new()),
            TaskDispatcher::new(registry),
        )
    }

    #[rstest]
    fn poll_processes_buffered_requests(mut service: NetworkService) {
        let (client, sender) = test_client(1);
        service.monitor().notify_connection(client.clone());
        service.monitor().notify_request(ClientRequest::text(
            client,
            r#"{"jsonrpc":"2.0","id":1,"method":"echo","params":[1]}"#,
        ));

        service.poll();

        assert_eq!(sender.messages()[0]["result"], json!([1]));
        assert!(!service.has_pending_work());
    }

    #[rstest]
    fn wait_blocks_until_a_request_arrives(mut service: NetworkService) {
        let (client, sender) = test_client(2);
        let monitor = Arc::clone(service.monitor());
        let producer = thread::spawn(move || {
            monitor.notify_request(ClientRequest::text(
                client,
                r#"{"jsonrpc":"2.0","id":"x","method":"echo"}"#,
            ));
        });

        service.wait();
        producer.join().expect("producer thread");

        assert_eq!(sender.messages()[0]["id"], "x");
    }

    #[rstest]
    fn idle_iterations_still_update_entrypoints() {
        let mut hooks = MockHooks::new();
        hooks.expect_on_update().times(2).return_const(());
        let mut registry = builtin_registry();
        registry
            .add(HookedEntrypoint::shared("render", hooks))
            .expect("register render");
        let mut service =
            NetworkService::new(Arc::new(NetworkMonitor::new()), TaskDispatcher::new(registry));

        service.poll();
        service.wait_timeout(Duration::from_millis(5));
    }

    #[rstest]
    fn shutdown_discards_buffered_events(mut service: NetworkService) {
        let (client, sender) = test_client(3);
        service.monitor().notify_request(ClientRequest::text(
            client,
            r#"{"jsonrpc":"2.0","id":1,"method":"echo"}"#,
        ));

        service.shutdown();
        service.poll();

        assert!(sender.messages().is_empty());
    }
}
