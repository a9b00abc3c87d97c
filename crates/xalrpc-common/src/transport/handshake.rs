//! HTTP upgrade exchange that opens a framed connection.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::transport::error::TransportError;

/// Fixed GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const WEBSOCKET_VERSION: &str = "13";

/// Upper bound on the size of a handshake header block.
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// A fresh random client key: 16 random bytes, base64 encoded.
pub fn generate_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// `base64(sha1(key + GUID))`, the token a server must answer with.
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

pub fn client_request(host: &str, key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: {}\r\n\
         \r\n",
        host, key, WEBSOCKET_VERSION
    )
}

pub fn server_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept
    )
}

/// Reads lines up to and excluding the blank line that ends a header block.
pub async fn read_header_block<R>(reader: &mut R) -> Result<Vec<String>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut total = 0;
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => TransportError::Handshake("header is not UTF-8".to_string()),
                _ => TransportError::from_io(e, "reading handshake"),
            })?;
        if read == 0 {
            return Err(TransportError::ConnectionDropped(
                "connection closed during handshake".to_string(),
            ));
        }
        total += read;
        if total > MAX_HEADER_BYTES {
            return Err(TransportError::Handshake("header block too large".to_string()));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(lines);
        }
        lines.push(line.to_string());
    }
}

/// Case-insensitive lookup of a header in a block read by
/// [`read_header_block`]; the first line (request or status line) is skipped.
pub fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Sends the upgrade request and checks the server's answer.
pub async fn client_handshake<S>(stream: &mut S, host: &str) -> Result<(), TransportError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    stream
        .write_all(client_request(host, &key).as_bytes())
        .await
        .map_err(|e| TransportError::from_io(e, "sending handshake"))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::from_io(e, "sending handshake"))?;

    let lines = read_header_block(stream).await?;
    let status = lines.first().map(String::as_str).unwrap_or_default();
    if status.split_whitespace().nth(1) != Some("101") {
        return Err(TransportError::Handshake(format!("unexpected status line '{}'", status)));
    }
    let expected = accept_token(&key);
    match header_value(&lines, "Sec-WebSocket-Accept") {
        Some(accept) if accept == expected => Ok(()),
        Some(accept) => Err(TransportError::Handshake(format!("wrong accept token '{}'", accept))),
        None => Err(TransportError::Handshake("missing accept token".to_string())),
    }
}

/// Reads an upgrade request and answers it.
pub async fn server_handshake<S>(stream: &mut S) -> Result<(), TransportError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let lines = read_header_block(stream).await?;
    let request_line = lines.first().map(String::as_str).unwrap_or_default();

    let key = match header_value(&lines, "Sec-WebSocket-Key") {
        Some(key) if request_line.starts_with("GET ") => key.to_string(),
        _ => {
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            let _ = stream.flush().await;
            return Err(TransportError::Handshake(format!(
                "not an upgrade request: '{}'",
                request_line
            )));
        }
    };

    stream
        .write_all(server_response(&accept_token(&key)).as_bytes())
        .await
        .map_err(|e| TransportError::from_io(e, "answering handshake"))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::from_io(e, "answering handshake"))?;
    Ok(())
}
