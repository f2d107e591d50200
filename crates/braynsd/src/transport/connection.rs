//! Per-connection bridge between a socket and the network monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::client::{ClientId, ClientRef, ClientRequest, ClientSender, Framing, SendError};
use crate::monitor::NetworkMonitor;

use super::{ConnectionHandler, ConnectionStream, FrameError, LISTENER_TARGET, read_frame, write_frame};

/// Write half of a connection, shared by every request of the client.
struct StreamSender {
    client: ClientId,
    stream: Mutex<ConnectionStream>,
}

impl ClientSender for StreamSender {
    fn send_text(&self, text: &str) -> Result<(), SendError> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| SendError::Poisoned {
                client: self.client,
            })?;
        write_frame(&mut *stream, Framing::Text, text.as_bytes()).map_err(|error| match error {
            FrameError::Io { source }
                if matches!(
                    source.kind(),
                    std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::NotConnected
                ) =>
            {
                SendError::Disconnected {
                    client: self.client,
                }
            }
            FrameError::Io { source } => SendError::Io {
                client: self.client,
                source,
            },
            other => SendError::Io {
                client: self.client,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, other),
            },
        })
    }
}

/// Connection handler that reports connections, frames and disconnections
/// to a [`NetworkMonitor`].
///
/// Each accepted connection gets a fresh [`ClientId`]. A frame that cannot
/// be read, including one larger than `max_frame_bytes`, closes the
/// connection.
#[derive(Debug)]
pub struct MonitorConnectionHandler {
    monitor: Arc<NetworkMonitor>,
    max_frame_bytes: usize,
    next_id: AtomicU64,
}

impl MonitorConnectionHandler {
    /// Creates a handler feeding `monitor`.
    #[must_use]
    pub fn new(monitor: Arc<NetworkMonitor>, max_frame_bytes: usize) -> Self {
        Self {
            monitor,
            max_frame_bytes,
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, stream: &ConnectionStream) -> Option<ClientRef> {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        match stream.try_clone() {
            Ok(writer) => Some(ClientRef::new(
                id,
                Arc::new(StreamSender {
                    client: id,
                    stream: Mutex::new(writer),
                }),
            )),
            Err(error) => {
                warn!(target: LISTENER_TARGET, client = %id, %error, "failed to split connection");
                None
            }
        }
    }
}

impl ConnectionHandler for MonitorConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let Some(client) = self.register(&stream) else {
            return;
        };
        debug!(target: LISTENER_TARGET, client = %client.id(), "connection opened");
        self.monitor.notify_connection(client.clone());

        loop {
            match read_frame(&mut stream, self.max_frame_bytes) {
                Ok(Some((framing, payload))) => {
                    self.monitor
                        .notify_request(ClientRequest::new(client.clone(), payload, framing));
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(
                        target: LISTENER_TARGET,
                        client = %client.id(),
                        %error,
                        "closing connection after frame error"
                    );
                    if let Err(error) = stream.shutdown() {
                        debug!(target: LISTENER_TARGET, %error, "socket shutdown failed");
                    }
                    break;
                }
            }
        }

        debug!(target: LISTENER_TARGET, client = %client.id(), "connection closed");
        self.monitor.notify_disconnection(client);
    }
}
