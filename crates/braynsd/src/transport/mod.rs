//! Socket transport feeding the [`NetworkMonitor`](crate::NetworkMonitor).
//!
//! A background thread accepts TCP or Unix connections; each connection is
//! served on its own thread, which turns frames into requests for the
//! monitor and writes replies back through a [`ClientSender`](crate::ClientSender).
//!
//! ## Framing
//!
//! Every frame starts with a one-byte tag (`0` text, `1` binary) and a
//! little-endian `u32` payload length. Text payloads are a JSON-RPC
//! envelope; binary payloads use the length-prefixed layout understood by
//! the request parser. Frames sent to clients are always text.

mod connection;
mod errors;
mod frame;
mod listener;
mod stream;

pub use self::connection::MonitorConnectionHandler;
pub use self::errors::{FrameError, ListenerError};
pub use self::frame::{FRAME_HEADER_BYTES, read_frame, write_frame};
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
