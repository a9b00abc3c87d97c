//! xalrpc Common Types, Codec and Transport
//!
//! This crate provides the pieces shared by xalrpc clients and servers.
//!
//! # Overview
//!
//! xalrpc calls methods of remote services by exchanging JSON messages over
//! persistent, WebSocket-style framed TCP connections:
//!
//! - **Coding Layer**: JSON encoding of arbitrary value graphs, preserving
//!   shared and cyclic structure and carrying registered custom types
//! - **Protocol Layer**: Request/Response messages, method metadata and
//!   resolution, remote exceptions and error types
//! - **Transport Layer**: upgrade handshake and text framing
//!
//! # Architecture
//!
//! - **Transport**: TCP, one upgrade handshake per connection
//! - **Framing**: one text frame per message, 100 MB limit
//! - **Request**: `{"message": "service#method", "params": [...], "id": n}`
//! - **Response**: `{"result": ..., "id": n, "error": ...}`
//!
//! # Components
//!
//! - [`coding`] - Value model and JSON codec
//! - [`protocol`] - Request, Response, RpcError, method metadata
//! - [`transport`] - FrameTransport and its building blocks
//!
//! # Example
//!
//! ```
//! use xalrpc_common::{JsonCoder, Request, Response, Value};
//!
//! let coder = JsonCoder::standard();
//! let request = Request::new(1, "calc", "add", vec![Value::from(3), Value::from(4)]);
//! let text = coder.encode(&request.to_value()).unwrap();
//!
//! let response = Response::success(request.id, Value::from(7));
//! assert!(response.is_success());
//! # let _ = text;
//! ```

pub mod coding;
pub mod protocol;
pub mod transport;

pub use coding::{CodingError, JsonCoder, Value};
pub use protocol::*;
