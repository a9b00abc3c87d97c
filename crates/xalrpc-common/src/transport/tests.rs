use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};

use super::frame::{encode_frame, read_frame};
use super::handshake::{client_request, generate_key, read_header_block};
use super::*;

const MASK: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

async fn connected_pair() -> (FrameTransport<DuplexStream>, FrameTransport<DuplexStream>) {
    let (client_side, server_side) = tokio::io::duplex(256 * 1024);
    let server = tokio::spawn(async move { FrameTransport::server(server_side).await });
    let client = FrameTransport::client(client_side, "localhost:0").await.unwrap();
    let server = server.await.unwrap().unwrap();
    (client, server)
}

/// Raw client end that has completed the handshake by hand.
async fn raw_client_and_server() -> (BufReader<DuplexStream>, FrameTransport<DuplexStream>) {
    let (client_side, server_side) = tokio::io::duplex(256 * 1024);
    let server = tokio::spawn(async move { FrameTransport::server(server_side).await });

    let mut raw = BufReader::new(client_side);
    raw.write_all(client_request("localhost:0", &generate_key()).as_bytes())
        .await
        .unwrap();
    raw.flush().await.unwrap();
    let status = read_header_block(&mut raw).await.unwrap();
    assert!(status[0].contains("101"));

    (raw, server.await.unwrap().unwrap())
}

// ============================================================================
// Frame encoding
// ============================================================================

#[test]
fn test_length_encodings() {
    assert_eq!(encode_frame(true, Opcode::Text, &[b'a'; 125], None).len(), 2 + 125);
    assert_eq!(encode_frame(true, Opcode::Text, &[b'a'; 126], None).len(), 4 + 126);
    assert_eq!(encode_frame(true, Opcode::Text, &vec![b'a'; 65535], None).len(), 4 + 65535);
    assert_eq!(encode_frame(true, Opcode::Text, &vec![b'a'; 65536], None).len(), 10 + 65536);
}

#[test]
fn test_header_bytes() {
    let frame = encode_frame(true, Opcode::Text, b"hi", None);
    assert_eq!(frame, vec![0x81, 0x02, b'h', b'i']);

    let frame = encode_frame(false, Opcode::Continuation, &[0u8; 300], Some(MASK));
    assert_eq!(&frame[..8], &[0x00, 0x80 | 126, 0x01, 0x2C, 0x12, 0x34, 0x56, 0x78]);
}

#[tokio::test]
async fn test_masked_frame_is_unmasked_on_read() {
    let bytes = encode_frame(true, Opcode::Text, b"hello frames", Some(MASK));
    assert_ne!(&bytes[6..], b"hello frames");

    let frame = read_frame(&mut &bytes[..]).await.unwrap();
    assert!(frame.fin);
    assert_eq!(frame.opcode, Opcode::Text);
    assert_eq!(frame.payload, b"hello frames");
}

#[tokio::test]
async fn test_eof_inside_frame_is_connection_dropped() {
    let bytes = encode_frame(true, Opcode::Text, b"truncated payload", None);
    let err = read_frame(&mut &bytes[..10]).await.unwrap_err();
    assert!(err.is_connection_dropped());
}

#[tokio::test]
async fn test_oversized_frame_rejected_before_payload() {
    let mut bytes = vec![0x81, 127];
    bytes.extend_from_slice(&(MAX_MESSAGE_SIZE as u64 + 1).to_be_bytes());
    let err = read_frame(&mut &bytes[..]).await.unwrap_err();
    assert!(matches!(err, TransportError::MessageTooLarge { .. }));
}

#[tokio::test]
async fn test_unknown_opcode_rejected() {
    let bytes = [0x83, 0x00];
    let err = read_frame(&mut &bytes[..]).await.unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)));
}

// ============================================================================
// Connections
// ============================================================================

#[tokio::test]
async fn test_messages_flow_both_ways() {
    let (mut client, mut server) = connected_pair().await;
    assert_eq!(client.role(), Role::Client);
    assert_eq!(server.role(), Role::Server);

    client.send_text("ping from client").await.unwrap();
    assert_eq!(server.receive_text().await.unwrap(), "ping from client");

    let large = "x".repeat(70_000);
    server.send_text(&large).await.unwrap();
    assert_eq!(client.receive_text().await.unwrap(), large);
}

#[tokio::test]
async fn test_fragmented_message_reassembled() {
    let (mut raw, mut server) = raw_client_and_server().await;
    raw.write_all(&encode_frame(false, Opcode::Text, b"hel", Some(MASK))).await.unwrap();
    raw.write_all(&encode_frame(true, Opcode::Continuation, b"lo", Some(MASK))).await.unwrap();
    raw.flush().await.unwrap();

    assert_eq!(server.receive_text().await.unwrap(), "hello");
}

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let (mut raw, mut server) = raw_client_and_server().await;
    raw.write_all(&encode_frame(true, Opcode::Ping, b"beat", Some(MASK))).await.unwrap();
    raw.write_all(&encode_frame(true, Opcode::Text, b"after", Some(MASK))).await.unwrap();
    raw.flush().await.unwrap();

    assert_eq!(server.receive_text().await.unwrap(), "after");
    let pong = read_frame(&mut raw).await.unwrap();
    assert_eq!(pong.opcode, Opcode::Pong);
    assert_eq!(pong.payload, b"beat");
}

#[tokio::test]
async fn test_close_frame_ends_connection() {
    let (mut client, mut server) = connected_pair().await;
    client.close().await;
    assert!(client.is_closed());

    let err = server.receive_text().await.unwrap_err();
    assert!(err.is_connection_dropped());
    assert!(server.is_closed());
    assert!(server.send_text("late").await.is_err());
}

#[tokio::test]
async fn test_peer_drop_is_connection_dropped() {
    let (client, mut server) = connected_pair().await;
    drop(client);
    assert!(server.receive_text().await.unwrap_err().is_connection_dropped());
}

#[tokio::test]
async fn test_server_rejects_non_upgrade_request() {
    let (client_side, server_side) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move { FrameTransport::server(server_side).await });

    let mut raw = BufReader::new(client_side);
    raw.write_all(b"HELLO THERE\r\n\r\n").await.unwrap();
    raw.flush().await.unwrap();

    assert!(matches!(server.await.unwrap(), Err(TransportError::Handshake(_))));
    let answer = read_header_block(&mut raw).await.unwrap();
    assert!(answer[0].contains("400"));
}

#[tokio::test]
async fn test_client_rejects_wrong_accept_token() {
    let (client_side, server_side) = tokio::io::duplex(4096);
    let client = tokio::spawn(async move { FrameTransport::client(client_side, "localhost:0").await });

    let mut raw = BufReader::new(server_side);
    read_header_block(&mut raw).await.unwrap();
    raw.write_all(b"HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: bogus\r\n\r\n")
        .await
        .unwrap();
    raw.flush().await.unwrap();

    assert!(matches!(client.await.unwrap(), Err(TransportError::Handshake(_))));
}

#[tokio::test]
async fn test_connect_to_closed_port_is_connection_dropped() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = FrameTransport::connect("127.0.0.1", port, Duration::from_secs(2)).await;
    assert!(result.unwrap_err().is_connection_dropped());
}

#[tokio::test]
async fn test_check_idle_detects_peer_close() {
    let (mut client, mut server) = connected_pair().await;
    assert!(client.check_idle().await);
    assert!(!client.is_closed());

    server.close().await;
    drop(server);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!client.check_idle().await);
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_debug_shows_role_and_state() {
    let (client, mut server) = connected_pair().await;
    server.close().await;

    let client = format!("{:?}", client);
    assert!(client.contains("Client"), "{}", client);
    assert!(client.contains("closed: false"), "{}", client);
    let server = format!("{:?}", server);
    assert!(server.contains("Server"), "{}", server);
    assert!(server.contains("closed: true"), "{}", server);
}

#[tokio::test]
async fn test_tcp_connect_and_accept() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FrameTransport::accept(stream).await.unwrap();
        let text = transport.receive_text().await.unwrap();
        transport.send_text(&text.to_uppercase()).await.unwrap();
    });

    let mut client = FrameTransport::connect("127.0.0.1", port, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(client.peer_addr().is_some());
    client.send_text("over tcp").await.unwrap();
    assert_eq!(client.receive_text().await.unwrap(), "OVER TCP");
    server.await.unwrap();
}
