//! Integration tests against a synthetic dataplane.
//!
//! Each test binds a real Unix socket, answers the registration handshake
//! the way the dataplane would, and then drives the client end to end.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use vapi_client::codec::{encode, Value};
use vapi_client::protocol::handshake::register_reply_schema;
use vapi_client::protocol::{
    FrameHeader, HEADER_SIZE, REGISTER_CLIENT_MSG_ID, REGISTER_CONTEXT,
};
use vapi_client::{Client, VapiError};

/// Unique socket path under the system temp directory.
fn scratch_socket(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    std::env::temp_dir().join(format!("vapi-it-{tag}-{}-{nanos:x}.sock", std::process::id()))
}

async fn read_frame(stream: &mut UnixStream) -> (u16, Vec<u8>) {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).await.unwrap();
    let header = FrameHeader::decode(&header).unwrap();
    let mut payload = vec![0u8; header.payload_length as usize];
    stream.read_exact(&mut payload).await.unwrap();
    (header.msg_id, payload)
}

async fn write_frame(stream: &mut UnixStream, msg_id: u16, payload: &[u8]) {
    let header = FrameHeader::new(msg_id, payload.len() as u32);
    stream.write_all(&header.encode()).await.unwrap();
    stream.write_all(payload).await.unwrap();
}

/// Registration reply payload, encoded the way the dataplane would.
fn registration_reply(response: i32, index: u32, entries: &[(&str, u16)]) -> Vec<u8> {
    let table = entries
        .iter()
        .map(|(name, id)| Value::Struct(vec![Value::U16(*id), Value::String((*name).to_string())]))
        .collect();
    let value = Value::Struct(vec![
        Value::U16(REGISTER_CLIENT_MSG_ID + 1),
        Value::U32(REGISTER_CONTEXT),
        Value::I32(response),
        Value::U32(index),
        Value::U32(0), // count field is written by the engine
        Value::Array(table),
    ]);
    encode(register_reply_schema(), &value).unwrap()
}

/// Accept one connection and answer its registration request.
async fn serve_handshake(
    listener: &UnixListener,
    index: u32,
    entries: &[(&str, u16)],
) -> UnixStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    let (msg_id, payload) = read_frame(&mut stream).await;
    assert_eq!(msg_id, REGISTER_CLIENT_MSG_ID);
    // id + client_index + context + fixed 64-byte name
    assert_eq!(payload.len(), 74);
    assert_eq!(&payload[0..2], &REGISTER_CLIENT_MSG_ID.to_be_bytes());
    assert_eq!(&payload[2..6], &[0u8; 4]);
    assert_eq!(&payload[6..10], &REGISTER_CONTEXT.to_be_bytes());

    let reply = registration_reply(0, index, entries);
    write_frame(&mut stream, REGISTER_CLIENT_MSG_ID + 1, &reply).await;
    stream
}

/// The full first-connection scenario: the socket does not exist yet, the
/// dataplane comes up late, the client waits, registers as "testclient" and
/// learns the message table.
#[tokio::test]
async fn test_connect_waits_for_socket_then_registers() {
    let path = scratch_socket("scenario");
    let server_path = path.clone();

    let server = tokio::spawn(async move {
        // bind only after the client has started waiting
        tokio::time::sleep(Duration::from_millis(200)).await;
        let listener = UnixListener::bind(&server_path).unwrap();
        let mut stream =
            serve_handshake(&listener, 7, &[("show_version_abcdef12\0\x13", 42)]).await;
        // hold the connection until the client closes it
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let client = Client::builder()
        .socket_path(&path)
        .client_name("testclient")
        .socket_wait_timeout(Duration::from_secs(10))
        .connect()
        .await
        .unwrap();

    assert_eq!(client.client_index(), 7);
    assert_eq!(client.lookup("show_version", "abcdef12").unwrap(), 42);
    assert!(matches!(
        client.lookup("show_version", "ffffffff"),
        Err(VapiError::UnknownMessage { .. })
    ));
    assert!(matches!(
        client.lookup("sw_interface_dump", "abcdef12"),
        Err(VapiError::UnknownMessage { .. })
    ));

    // disconnect is idempotent
    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();
    assert!(!client.is_connected());

    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Round trip of a payload larger than the 4096-byte transport buffers,
/// plus the in-place client_index/context rewrite and the minimum-payload
/// check.
#[tokio::test]
async fn test_send_and_receive_large_frames() {
    let path = scratch_socket("large");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let mut stream = serve_handshake(&listener, 3, &[("echo_00000000", 100)]).await;
        let (msg_id, payload) = read_frame(&mut stream).await;
        write_frame(&mut stream, msg_id, &payload).await;
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Client::builder()
        .socket_path(&path)
        .on_message(move |msg_id, payload: Bytes| {
            let _ = tx.send((msg_id, payload));
        })
        .connect()
        .await
        .unwrap();

    let msg_id = client.lookup("echo", "00000000").unwrap();

    // below the minimum: rejected before touching the socket
    let mut short = [0u8; 4];
    assert!(matches!(
        client.send_request(msg_id, 9, &mut short).await,
        Err(VapiError::PayloadTooShort { len: 4, min: 10 })
    ));

    let mut payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    payload[0..2].copy_from_slice(&msg_id.to_be_bytes());
    client.send_request(msg_id, 9, &mut payload).await.unwrap();

    let (got_id, got_payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("echo should arrive")
        .unwrap();
    assert_eq!(got_id, 100);
    assert_eq!(got_payload.len(), 10_000);
    // bytes [2:10) were rewritten before framing
    assert_eq!(&got_payload[2..6], &3u32.to_be_bytes());
    assert_eq!(&got_payload[6..10], &9u32.to_be_bytes());
    assert_eq!(&got_payload[10..], &payload[10..]);

    client.disconnect().await.unwrap();
    assert!(matches!(
        client.send_request(msg_id, 10, &mut payload).await,
        Err(VapiError::ConnectionClosed)
    ));

    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Inbound frames reach the callback in exact arrival order.
#[tokio::test]
async fn test_inbound_frames_delivered_in_order() {
    let path = scratch_socket("order");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let mut stream = serve_handshake(&listener, 1, &[]).await;
        for i in 1..=5u16 {
            write_frame(&mut stream, 200 + i, &[i as u8; 16]).await;
        }
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Client::builder()
        .socket_path(&path)
        .on_message(move |msg_id, payload: Bytes| {
            let _ = tx.send((msg_id, payload));
        })
        .connect()
        .await
        .unwrap();

    for i in 1..=5u16 {
        let (msg_id, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame should arrive")
            .unwrap();
        assert_eq!(msg_id, 200 + i);
        assert_eq!(payload.len(), 16);
        assert!(payload.iter().all(|&b| b == i as u8));
    }

    client.disconnect().await.unwrap();
    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

/// A non-zero registration response is a connect error, not a partial
/// success.
#[tokio::test]
async fn test_registration_rejection() {
    let path = scratch_socket("reject");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await;
        let reply = registration_reply(-93, 0, &[]);
        write_frame(&mut stream, REGISTER_CLIENT_MSG_ID + 1, &reply).await;
    });

    let err = Client::builder()
        .socket_path(&path)
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, VapiError::RegistrationFailed { retval: -93 }));

    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

/// A dataplane that accepts but never answers trips the connect timeout.
#[tokio::test]
async fn test_handshake_timeout() {
    let path = scratch_socket("timeout");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await;
        // never reply; hold the socket open past the client's deadline
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let err = Client::builder()
        .socket_path(&path)
        .connect_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, VapiError::HandshakeTimeout));

    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Disconnect completes even when the peer stays silent, within the
/// configured disconnect timeout.
#[tokio::test]
async fn test_disconnect_with_idle_peer_is_prompt() {
    let path = scratch_socket("idle");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let mut stream = serve_handshake(&listener, 2, &[]).await;
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });

    let client = Client::builder()
        .socket_path(&path)
        .disconnect_timeout(Duration::from_millis(100))
        .connect()
        .await
        .unwrap();

    let start = std::time::Instant::now();
    client.disconnect().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}
