//! Client identity and the outbound half of a transport connection.
//!
//! A [`ClientRef`] is the key the dispatch layer uses to attribute requests,
//! disconnections and cancellations to a connected endpoint. It compares and
//! hashes by [`ClientId`] only; the attached [`ClientSender`] exists so replies
//! can be routed back without the dispatch layer knowing anything about
//! sockets.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Numeric identity assigned by the transport when a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "client-{}", self.0)
    }
}

/// Errors raised while delivering a message to a client.
#[derive(Debug, Error)]
pub enum SendError {
    /// The client closed its connection before the message was written.
    #[error("{client} is disconnected")]
    Disconnected {
        /// Client that could not be reached.
        client: ClientId,
    },
    /// Writing to the underlying stream failed.
    #[error("failed to write to {client}: {source}")]
    Io {
        /// Client whose stream failed.
        client: ClientId,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The writer lock was poisoned by a panicking writer.
    #[error("writer for {client} is poisoned")]
    Poisoned {
        /// Client whose writer is unusable.
        client: ClientId,
    },
}

/// Outbound channel to a single client, implemented by the transport.
pub trait ClientSender: Send + Sync {
    /// Delivers one text message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when the client is gone or the write fails.
    fn send_text(&self, text: &str) -> Result<(), SendError>;
}

/// Shared handle identifying a connected client.
#[derive(Clone)]
pub struct ClientRef {
    id: ClientId,
    sender: Arc<dyn ClientSender>,
}

impl ClientRef {
    /// Builds a client handle from its identity and outbound channel.
    pub fn new(id: ClientId, sender: Arc<dyn ClientSender>) -> Self {
        Self { id, sender }
    }

    /// Identity used for equality, hashing and logging.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Sends a text message through the transport.
    ///
    /// # Errors
    ///
    /// Propagates the transport's [`SendError`].
    pub fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.sender.send_text(text)
    }
}

impl PartialEq for ClientRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientRef {}

impl Hash for ClientRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ClientRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("ClientRef").field(&self.id).finish()
    }
}

/// How a request payload was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The whole payload is JSON text.
    Text,
    /// Length-prefixed JSON followed by a raw binary tail.
    Binary,
}

/// Raw request as received from the transport, before any parsing.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    client: ClientRef,
    payload: Vec<u8>,
    framing: Framing,
}

impl ClientRequest {
    /// Captures a received frame.
    #[must_use]
    pub fn new(client: ClientRef, payload: Vec<u8>, framing: Framing) -> Self {
        Self {
            client,
            payload,
            framing,
        }
    }

    /// Builds a text-framed request.
    #[must_use]
    pub fn text(client: ClientRef, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(client, payload.into(), Framing::Text)
    }

    /// Builds a binary-framed request.
    #[must_use]
    pub fn binary(client: ClientRef, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(client, payload.into(), Framing::Binary)
    }

    /// Client that sent the frame.
    #[must_use]
    pub fn client(&self) -> &ClientRef {
        &self.client
    }

    /// Raw frame bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Frame type.
    #[must_use]
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Splits the request into its parts.
    #[must_use]
    pub fn into_parts(self) -> (ClientRef, Vec<u8>, Framing) {
        (self.client, self.payload, self.framing)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::test_support::RecordingSender;

    use super::*;

    #[test]
    fn clients_compare_by_id_only() {
        let first = ClientRef::new(ClientId::new(7), Arc::new(RecordingSender::default()));
        let second = ClientRef::new(ClientId::new(7), Arc::new(RecordingSender::default()));
        let other = ClientRef::new(ClientId::new(8), Arc::new(RecordingSender::default()));

        assert_eq!(first, second);
        assert_ne!(first, other);

        let set: HashSet<_> = [first, second, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn client_id_displays_with_prefix() {
        assert_eq!(ClientId::new(3).to_string(), "client-3");
    }
}
