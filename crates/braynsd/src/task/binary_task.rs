//! Task forwarding raw binary chunks to their consumer.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::client::ClientRef;
use crate::jsonrpc::{JsonRpcError, RequestId};

use super::{TASK_TARGET, Task};

/// Method name reported by binary tasks in logs.
pub const BINARY_METHOD: &str = "binary";

/// Receiver of raw binary chunks (for example an upload assembler).
pub trait BinaryConsumer: Send + Sync {
    /// Accepts one chunk sent by `client`.
    ///
    /// # Errors
    ///
    /// Errors are logged; there is no request id to reply against.
    fn on_binary(&self, client: &ClientRef, data: &[u8]) -> Result<(), JsonRpcError>;
}

/// Always-priority task delivering a binary chunk.
pub struct BinaryTask {
    client: ClientRef,
    id: RequestId,
    data: Vec<u8>,
    consumer: Arc<dyn BinaryConsumer>,
}

impl BinaryTask {
    /// Wraps a chunk received from `client`.
    #[must_use]
    pub fn new(client: ClientRef, data: Vec<u8>, consumer: Arc<dyn BinaryConsumer>) -> Self {
        Self {
            client,
            id: RequestId::Absent,
            data,
            consumer,
        }
    }
}

impl fmt::Debug for BinaryTask {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BinaryTask")
            .field("client", &self.client)
            .field("bytes", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Task for BinaryTask {
    fn client(&self) -> &ClientRef {
        &self.client
    }

    fn id(&self) -> &RequestId {
        &self.id
    }

    fn method(&self) -> &str {
        BINARY_METHOD
    }

    fn has_priority(&self) -> bool {
        true
    }

    fn run(&mut self) {
        if let Err(error) = self.consumer.on_binary(&self.client, &self.data) {
            warn!(
                target: TASK_TARGET,
                client = %self.client.id(),
                %error,
                "binary consumer rejected chunk"
            );
        }
    }

    fn cancel(&mut self) -> Result<(), JsonRpcError> {
        // No client can name a binary task, so reaching this is a bug.
        Err(JsonRpcError::internal("binary tasks cannot be cancelled"))
    }

    fn disconnect(&mut self) {}
}
