//! JSON-RPC envelope handling.
//!
//! Inbound frames are parsed by [`parser::parse`] into a [`RequestMessage`],
//! which the dispatcher binds to its client as a [`JsonRpcRequest`]. Replies,
//! errors and progress pushes leave through that request so the
//! "exactly one answer, none for notifications" rule lives in one place.
//!
//! ## Wire shapes
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"get-camera","params":{}}
//! {"jsonrpc":"2.0","id":1,"result":{"position":[0,0,10]}}
//! {"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method 'x' not found"}}
//! {"jsonrpc":"2.0","method":"progress","params":{"id":1,"operation":"load","amount":0.5}}
//! ```

pub mod errors;
pub mod message;
pub mod parser;
mod request;

pub use self::errors::{JsonRpcError, ValidationError};
pub use self::message::{RequestId, RequestMessage};
pub use self::parser::{Envelope, RejectedRequest, parse};
pub use self::request::JsonRpcRequest;

const REQUEST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::request");
