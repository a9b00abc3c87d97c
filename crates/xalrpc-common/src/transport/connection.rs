use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::transport::error::TransportError;
use crate::transport::frame::{read_frame, write_frame, Opcode, MAX_MESSAGE_SIZE};
use crate::transport::handshake::{client_handshake, server_handshake};

/// Which end of the connection this transport is.
///
/// Clients mask every frame they send with a fresh random key; servers send
/// unmasked frames. Both accept either on receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A message-oriented connection over a byte stream.
///
/// Created by completing the upgrade handshake, then exchanges whole UTF-8
/// text messages. Fragmented messages are reassembled, pings are answered
/// and a close frame from the peer ends the connection.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use xalrpc_common::transport::FrameTransport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut transport = FrameTransport::connect("127.0.0.1", 9001, Duration::from_secs(5)).await?;
/// transport.send_text(r#"{"id":1,"message":"calc#add","params":[3,4]}"#).await?;
/// let reply = transport.receive_text().await?;
/// # Ok(())
/// # }
/// ```
pub struct FrameTransport<S = TcpStream> {
    stream: BufReader<S>,
    role: Role,
    peer_addr: Option<SocketAddr>,
    closed: bool,
}

impl<S> std::fmt::Debug for FrameTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTransport")
            .field("role", &self.role)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FrameTransport<TcpStream> {
    /// Opens a TCP connection and performs the client handshake.
    ///
    /// # Errors
    ///
    /// An unreachable endpoint, a timeout or a refused handshake are all
    /// reported as [`TransportError::ConnectionDropped`] or
    /// [`TransportError::Handshake`].
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", host, port);
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionDropped(format!(
                    "failed to connect to {}: {}",
                    addr, e
                )))
            }
            Err(_) => {
                return Err(TransportError::ConnectionDropped(format!(
                    "connecting to {} timed out after {}ms",
                    addr,
                    connect_timeout.as_millis()
                )))
            }
        };
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok();

        let handshake = Self::client(stream, &addr);
        let mut transport = match tokio::time::timeout(connect_timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "no handshake answer from {} within {}ms",
                    addr,
                    connect_timeout.as_millis()
                )))
            }
        };
        transport.peer_addr = peer_addr;
        tracing::debug!(addr = %addr, "Connection established");
        Ok(transport)
    }

    /// Performs the server handshake on an accepted TCP connection.
    pub async fn accept(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok();
        let mut transport = Self::server(stream).await?;
        transport.peer_addr = peer_addr;
        Ok(transport)
    }
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Client side of the handshake over an already connected stream.
    pub async fn client(stream: S, host: &str) -> Result<Self, TransportError> {
        let mut stream = BufReader::new(stream);
        client_handshake(&mut stream, host).await?;
        Ok(Self::from_parts(stream, Role::Client))
    }

    /// Server side of the handshake over an already connected stream.
    pub async fn server(stream: S) -> Result<Self, TransportError> {
        let mut stream = BufReader::new(stream);
        server_handshake(&mut stream).await?;
        Ok(Self::from_parts(stream, Role::Server))
    }

    fn from_parts(stream: BufReader<S>, role: Role) -> Self {
        FrameTransport {
            stream,
            role,
            peer_addr: None,
            closed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// True once any send or receive failed, or either side closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sends one text message as a single final frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionDropped("connection already closed".to_string()));
        }
        let mask = self.mask();
        let result = write_frame(&mut self.stream, Opcode::Text, text.as_bytes(), mask).await;
        self.track(result)
    }

    /// Receives the next complete text message.
    ///
    /// # Errors
    ///
    /// A peer close frame or end of stream is `ConnectionDropped`. After any
    /// error the transport reports itself closed.
    pub async fn receive_text(&mut self) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionDropped("connection already closed".to_string()));
        }
        let result = self.read_message().await;
        self.track(result)
    }

    async fn read_message(&mut self) -> Result<String, TransportError> {
        let mut message: Option<Vec<u8>> = None;
        loop {
            let frame = read_frame(&mut self.stream).await?;
            let mask = self.mask();
            match frame.opcode {
                Opcode::Ping => {
                    write_frame(&mut self.stream, Opcode::Pong, &frame.payload, mask).await?;
                    continue;
                }
                Opcode::Pong => continue,
                Opcode::Close => {
                    let _ = write_frame(&mut self.stream, Opcode::Close, &frame.payload, mask).await;
                    return Err(TransportError::ConnectionDropped("peer closed the connection".to_string()));
                }
                Opcode::Text | Opcode::Binary => {
                    if message.is_some() {
                        return Err(TransportError::Protocol(
                            "new message started inside a fragmented one".to_string(),
                        ));
                    }
                    message = Some(frame.payload);
                }
                Opcode::Continuation => match message.as_mut() {
                    Some(buffer) => {
                        if buffer.len() + frame.payload.len() > MAX_MESSAGE_SIZE {
                            return Err(TransportError::MessageTooLarge {
                                len: (buffer.len() + frame.payload.len()) as u64,
                                max: MAX_MESSAGE_SIZE,
                            });
                        }
                        buffer.extend_from_slice(&frame.payload);
                    }
                    None => {
                        return Err(TransportError::Protocol(
                            "continuation frame without a message".to_string(),
                        ))
                    }
                },
            }

            if frame.fin {
                let bytes = message.take().unwrap_or_default();
                return String::from_utf8(bytes).map_err(|_| TransportError::InvalidUtf8);
            }
        }
    }

    /// Checks, without waiting, that an idle connection is still usable.
    ///
    /// Between exchanges the peer has nothing to say, so pending bytes or end
    /// of stream mean it closed the connection or broke protocol. The
    /// transport is then marked closed.
    pub async fn check_idle(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match tokio::time::timeout(Duration::ZERO, self.stream.fill_buf()).await {
            Err(_) => true,
            Ok(_) => {
                self.closed = true;
                false
            }
        }
    }

    /// Sends a close frame and shuts the stream down.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mask = self.mask();
        let _ = write_frame(&mut self.stream, Opcode::Close, &[], mask).await;
        let _ = self.stream.shutdown().await;
    }

    fn mask(&self) -> Option<[u8; 4]> {
        match self.role {
            Role::Client => Some(rand::random()),
            Role::Server => None,
        }
    }

    fn track<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if result.is_err() {
            self.closed = true;
        }
        result
    }
}
