use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection dropped: {0}")]
    ConnectionDropped(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Message too large: {len} bytes (max {max} bytes)")]
    MessageTooLarge { len: u64, max: usize },

    #[error("Text frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Maps IO errors to transport errors.
    ///
    /// End of stream and reset/aborted connections mean the peer is gone and
    /// become `ConnectionDropped`; everything else stays an `Io` error.
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected => {
                TransportError::ConnectionDropped(format!("{}: connection lost", context))
            }
            _ => TransportError::Io(err),
        }
    }

    pub fn is_connection_dropped(&self) -> bool {
        matches!(self, TransportError::ConnectionDropped(_))
    }
}
