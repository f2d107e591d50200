//! Cross-thread inbox between transport threads and the dispatch loop.
//!
//! Transport threads only ever append and signal; the single consumer swaps
//! the whole buffer out under the same lock. Nothing is copied twice and
//! nothing is dropped between exchanges.

use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::client::{ClientRef, ClientRequest};

const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Events accumulated since the previous exchange, in arrival order per kind.
#[derive(Debug, Default)]
pub struct NetworkBuffer {
    /// Clients that connected.
    pub connected_clients: Vec<ClientRef>,
    /// Clients that disconnected.
    pub disconnected_clients: Vec<ClientRef>,
    /// Raw requests received.
    pub requests: Vec<ClientRequest>,
}

impl NetworkBuffer {
    /// Whether no event of any kind is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connected_clients.is_empty()
            && self.disconnected_clients.is_empty()
            && self.requests.is_empty()
    }
}

/// Shared inbox guarded by one mutex and one condition variable.
#[derive(Debug, Default)]
pub struct NetworkMonitor {
    buffer: Mutex<NetworkBuffer>,
    signal: Condvar,
}

impl NetworkMonitor {
    /// Creates an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection.
    pub fn notify_connection(&self, client: ClientRef) {
        trace!(target: MONITOR_TARGET, client = %client.id(), "connection queued");
        self.push(|buffer| buffer.connected_clients.push(client));
    }

    /// Records a disconnection.
    pub fn notify_disconnection(&self, client: ClientRef) {
        trace!(target: MONITOR_TARGET, client = %client.id(), "disconnection queued");
        self.push(|buffer| buffer.disconnected_clients.push(client));
    }

    /// Records an inbound request.
    pub fn notify_request(&self, request: ClientRequest) {
        trace!(
            target: MONITOR_TARGET,
            client = %request.client().id(),
            bytes = request.payload().len(),
            "request queued"
        );
        self.push(|buffer| buffer.requests.push(request));
    }

    /// Blocks until at least one event is pending, then takes everything.
    pub fn wait(&self) -> NetworkBuffer {
        let guard = self.lock();
        let mut guard = self
            .signal
            .wait_while(guard, |buffer| buffer.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *guard)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning an
    /// empty buffer.
    pub fn wait_timeout(&self, timeout: Duration) -> NetworkBuffer {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while guard.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return NetworkBuffer::default();
            }
            guard = self
                .signal
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        mem::take(&mut *guard)
    }

    /// Takes everything pending without blocking.
    pub fn poll(&self) -> NetworkBuffer {
        mem::take(&mut *self.lock())
    }

    /// Discards pending events; used at shutdown.
    pub fn clear(&self) {
        *self.lock() = NetworkBuffer::default();
    }

    fn push(&self, append: impl FnOnce(&mut NetworkBuffer)) {
        append(&mut self.lock());
        self.signal.notify_all();
    }

    // A panicking producer cannot leave the buffer half-appended, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, NetworkBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::test_support::test_client;

    #[fixture]
    fn monitor() -> Arc<NetworkMonitor> {
        Arc::new(NetworkMonitor::new())
    }

    fn ids(requests: &[ClientRequest]) -> Vec<u64> {
        requests
            .iter()
            .map(|request| request.client().id().get())
            .collect()
    }

    #[rstest]
    fn poll_returns_empty_buffer_when_idle(monitor: Arc<NetworkMonitor>) {
        assert!(monitor.poll().is_empty());
    }

    #[rstest]
    fn poll_takes_pending_events_once(monitor: Arc<NetworkMonitor>) {
        let (client, _) = test_client(1);
        monitor.notify_connection(client.clone());
        monitor.notify_request(ClientRequest::text(client.clone(), "{}"));
        monitor.notify_disconnection(client);

        let buffer = monitor.poll();
        assert_eq!(buffer.connected_clients.len(), 1);
        assert_eq!(buffer.requests.len(), 1);
        assert_eq!(buffer.disconnected_clients.len(), 1);
        assert!(monitor.poll().is_empty());
    }

    #[rstest]
    fn exchanges_preserve_order_without_loss(monitor: Arc<NetworkMonitor>) {
        let mut seen = Vec::new();
        for batch in [0..3_u64, 3..4, 4..9] {
            for raw in batch {
                let (client, _) = test_client(raw);
                monitor.notify_request(ClientRequest::text(client, "{}"));
            }
            seen.extend(ids(&monitor.poll().requests));
        }
        assert_eq!(seen, (0..9).collect::<Vec<_>>());
    }

    #[rstest]
    fn wait_blocks_until_a_producer_signals(monitor: Arc<NetworkMonitor>) {
        let producer = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                let (client, _) = test_client(42);
                monitor.notify_connection(client);
            })
        };

        let buffer = monitor.wait();
        assert_eq!(buffer.connected_clients.len(), 1);
        producer.join().expect("producer thread");
    }

    #[rstest]
    fn concurrent_producers_lose_nothing(monitor: Arc<NetworkMonitor>) {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 50;

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    for index in 0..PER_PRODUCER {
                        let (client, _) = test_client(producer * PER_PRODUCER + index);
                        monitor.notify_request(ClientRequest::text(client, "{}"));
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < usize::try_from(PRODUCERS * PER_PRODUCER).expect("fits") {
            received.extend(ids(&monitor.wait().requests));
        }
        for handle in handles {
            handle.join().expect("producer thread");
        }

        for producer in 0..PRODUCERS {
            let from_producer: Vec<_> = received
                .iter()
                .copied()
                .filter(|id| id / PER_PRODUCER == producer)
                .collect();
            let expected: Vec<_> =
                (producer * PER_PRODUCER..(producer + 1) * PER_PRODUCER).collect();
            assert_eq!(from_producer, expected, "producer {producer} order");
        }
        assert!(monitor.poll().is_empty());
    }

    #[rstest]
    fn wait_timeout_returns_empty_when_nothing_arrives(monitor: Arc<NetworkMonitor>) {
        let buffer = monitor.wait_timeout(Duration::from_millis(10));
        assert!(buffer.is_empty());
    }

    #[rstest]
    fn clear_discards_pending_events(monitor: Arc<NetworkMonitor>) {
        let (client, _) = test_client(1);
        monitor.notify_connection(client);
        monitor.clear();
        assert!(monitor.poll().is_empty());
    }
}
