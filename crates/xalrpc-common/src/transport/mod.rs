//! FrameTransport: WebSocket-style framing over TCP.
//!
//! # Architecture
//!
//! - **Handshake**: an HTTP/1.1 upgrade request answered with
//!   `101 Switching Protocols` and an accept token derived from the client's
//!   key (see [`handshake`])
//! - **Framing**: each message travels as a text frame with a 7, 16 or 64 bit
//!   length (see [`frame`])
//! - **Connection**: [`FrameTransport`] ties both together and exchanges
//!   whole UTF-8 messages
//!
//! # Message Size Limits
//!
//! Frames and reassembled messages are limited to 100 MB.

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;

pub use connection::{FrameTransport, Role};
pub use error::TransportError;
pub use frame::{Frame, Opcode, MAX_MESSAGE_SIZE};

#[cfg(test)]
mod tests;
