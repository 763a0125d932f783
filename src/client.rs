//! Client builder and connection runtime.
//!
//! The [`ClientBuilder`] provides a fluent API for configuration and the
//! inbound-message callback. [`ClientBuilder::connect`] runs the lifecycle:
//! 1. Resolve the socket path and wait for the file to exist
//! 2. Dial (stream flavor, one seqpacket retry)
//! 3. Register the client and build the message table
//! 4. Spawn the read loop
//!
//! # Example
//!
//! ```ignore
//! use vapi_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .client_name("example")
//!         .on_message(|msg_id, payload| {
//!             println!("message {msg_id}: {} bytes", payload.len());
//!         })
//!         .connect()
//!         .await?;
//!
//!     let msg_id = client.lookup("show_version", "51077d14")?;
//!     let mut payload = vec![0u8; 10];
//!     payload[0..2].copy_from_slice(&msg_id.to_be_bytes());
//!     client.send_request(msg_id, 1, &mut payload).await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{Result, VapiError};
use crate::protocol::handshake::{build_register_request, parse_register_reply, HandshakeReply};
use crate::protocol::{
    Frame, FrameHeader, HeaderPool, MessageTable, BUF_CAPACITY, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    MIN_PAYLOAD_SIZE, REGISTER_CLIENT_MSG_ID,
};
use crate::transport::{dial, resolve_socket_path, wait_for_socket};

/// Inbound frame callback: `(numeric message id, payload)`.
///
/// Invoked from the read loop in exact arrival order.
pub type MessageCallback = dyn Fn(u16, Bytes) + Send + Sync;

/// Builder for configuring and connecting a client.
pub struct ClientBuilder {
    config: ClientConfig,
    callback: Arc<MessageCallback>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            callback: Arc::new(|_, _| {}),
        }
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect to this socket path instead of the default.
    ///
    /// An explicit path disables the legacy-path fallback.
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = Some(path.into());
        self
    }

    /// Client name sent in the registration request.
    pub fn client_name(mut self, name: &str) -> Self {
        self.config.client_name = name.to_string();
        self
    }

    /// Bound on waiting for the registration reply. Default: 3s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on waiting for the read loop during disconnect. Default: 100ms.
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.disconnect_timeout = timeout;
        self
    }

    /// Bound on waiting for the socket file to appear. Default: 10s.
    pub fn socket_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_wait_timeout = timeout;
        self
    }

    /// Callback invoked with every inbound frame.
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(u16, Bytes) + Send + Sync + 'static,
    {
        self.callback = Arc::new(callback);
        self
    }

    /// Connect, register, and start the read loop.
    pub async fn connect(self) -> Result<Client> {
        Client::connect(self.config, self.callback).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The buffered writer plus the pooled header buffers it frames with, kept
/// together under one lock so a header is never interleaved with another
/// call's payload bytes.
struct WriterState<W> {
    writer: W,
    pool: HeaderPool,
}

struct ClientInner {
    client_index: u32,
    table: MessageTable,
    writer: Mutex<WriterState<BufWriter<OwnedWriteHalf>>>,
    stop_tx: watch::Sender<bool>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    /// Set by the read loop on exit (peer close or desync) and by
    /// disconnect; makes later sends fail fast instead of writing into a
    /// dead socket.
    closed: Arc<AtomicBool>,
    disconnected: AtomicBool,
    disconnect_timeout: Duration,
}

/// A connected, registered client.
///
/// Cheaply cloneable; all clones share one connection. `send` may be called
/// from any number of tasks concurrently, and `disconnect` from a different
/// task than the one that connected.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_index", &self.inner.client_index)
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn connect(config: ClientConfig, callback: Arc<MessageCallback>) -> Result<Self> {
        let path = resolve_socket_path(config.socket_path.as_deref());
        wait_for_socket(&path, config.socket_wait_timeout).await?;
        let stream = dial(&path).await?;
        let (read_half, write_half) = stream.into_split();

        let mut reader = BufReader::with_capacity(BUF_CAPACITY, read_half);
        let mut writer = WriterState {
            writer: BufWriter::with_capacity(BUF_CAPACITY, write_half),
            pool: HeaderPool::new(),
        };

        // the deadline covers only the handshake; once the future completes
        // it is gone, so the read loop starts with no deadline attached
        let reply = tokio::time::timeout(
            config.connect_timeout,
            run_handshake(&mut reader, &mut writer, &config.client_name),
        )
        .await
        .map_err(|_| VapiError::HandshakeTimeout)??;

        tracing::debug!(
            client_index = reply.client_index,
            messages = reply.table.len(),
            "registered with dataplane at {}",
            path.display()
        );

        let closed = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = watch::channel(false);
        let read_task = tokio::spawn(read_loop(reader, callback, stop_rx, closed.clone()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                client_index: reply.client_index,
                table: reply.table,
                writer: Mutex::new(writer),
                stop_tx,
                read_task: Mutex::new(Some(read_task)),
                closed,
                disconnected: AtomicBool::new(false),
                disconnect_timeout: config.disconnect_timeout,
            }),
        })
    }

    /// Client index assigned by the dataplane at registration.
    pub fn client_index(&self) -> u32 {
        self.inner.client_index
    }

    /// The message-id table learned at registration. Immutable for the
    /// connection's lifetime.
    pub fn message_table(&self) -> &MessageTable {
        &self.inner.table
    }

    /// Numeric id for `(name, crc)`, or the typed unknown-message error.
    pub fn lookup(&self, name: &str, crc: &str) -> Result<u16> {
        self.inner.table.lookup(name, crc)
    }

    /// Whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        !self.inner.disconnected.load(Ordering::Acquire)
            && !self.inner.closed.load(Ordering::Acquire)
    }

    /// Frame and write one pre-encoded message.
    ///
    /// `payload` must be at least [`MIN_PAYLOAD_SIZE`] bytes; bytes [2:10)
    /// are overwritten in place with `client_index` and `context`. The call
    /// returns once the whole frame has been flushed to the socket, and
    /// concurrent senders are serialized so each frame hits the wire as one
    /// unit.
    pub async fn send(
        &self,
        msg_id: u16,
        client_index: u32,
        context: u32,
        payload: &mut [u8],
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(VapiError::ConnectionClosed);
        }
        if payload.len() < MIN_PAYLOAD_SIZE {
            return Err(VapiError::PayloadTooShort {
                len: payload.len(),
                min: MIN_PAYLOAD_SIZE,
            });
        }
        payload[2..6].copy_from_slice(&client_index.to_be_bytes());
        payload[6..10].copy_from_slice(&context.to_be_bytes());

        let mut writer = self.inner.writer.lock().await;
        write_frame(&mut writer, msg_id, payload).await
    }

    /// [`send`](Self::send) with this connection's own client index.
    pub async fn send_request(&self, msg_id: u16, context: u32, payload: &mut [u8]) -> Result<()> {
        self.send(msg_id, self.inner.client_index, context, payload)
            .await
    }

    /// Tear the connection down.
    ///
    /// Signals the read loop, waits for it to exit within the configured
    /// disconnect timeout, aborts it if the deadline expires, then closes
    /// the socket. Calling this again, or on an already-dead connection, is
    /// a no-op. No client-removal message is sent; closing the socket is the
    /// intended teardown and keeps it side-effect-free on the dataplane.
    pub async fn disconnect(&self) -> Result<()> {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.inner.stop_tx.send(true);

        let task = self.inner.read_task.lock().await.take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.inner.disconnect_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if !e.is_cancelled() {
                        tracing::warn!("read loop ended abnormally: {e}");
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "read loop did not exit within {:?}; force-closing",
                        self.inner.disconnect_timeout
                    );
                    task.abort();
                }
            }
        }

        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.writer.shutdown().await {
            tracing::debug!("socket shutdown during disconnect: {e}");
        }
        Ok(())
    }
}

async fn run_handshake<R>(
    reader: &mut R,
    writer: &mut WriterState<BufWriter<OwnedWriteHalf>>,
    client_name: &str,
) -> Result<HandshakeReply>
where
    R: AsyncRead + Unpin,
{
    let payload = build_register_request(client_name)?;
    write_frame(writer, REGISTER_CLIENT_MSG_ID, &payload).await?;
    let frame = read_frame(reader).await?;
    parse_register_reply(&frame.payload)
}

/// Frame `payload` under `msg_id` and flush it.
async fn write_frame<W>(state: &mut WriterState<W>, msg_id: u16, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let WriterState { writer, pool } = state;
    let header = FrameHeader::new(msg_id, payload.len() as u32);
    writer.write_all(pool.encode(&header)).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame: exactly 16 header bytes, then exactly the announced
/// payload length. Payload length is never inferred from EOF.
async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&header_buf)?;
    if header.payload_length > MAX_PAYLOAD_SIZE {
        return Err(VapiError::Desynchronized {
            claimed: header.payload_length,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let mut payload = vec![0u8; header.payload_length as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Frame::new(header, Bytes::from(payload)))
}

/// Pull frames off the wire until stopped, delivering each to the callback
/// in arrival order.
async fn read_loop<R>(
    mut reader: R,
    callback: Arc<MessageCallback>,
    mut stop: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = stop.changed() => {
                tracing::debug!("read loop stopped");
                return;
            }
            result = read_frame(&mut reader) => match result {
                Ok(frame) => callback(frame.msg_id(), frame.payload),
                Err(VapiError::Io(e)) if is_closed_error(&e) => {
                    tracing::debug!("connection closed by peer");
                    closed.store(true, Ordering::Release);
                    return;
                }
                Err(e @ VapiError::Desynchronized { .. }) => {
                    // the next header read would be interpreting garbage;
                    // tear the read path down instead of spinning on it
                    tracing::error!("{e}; tearing down read path");
                    closed.store(true, Ordering::Release);
                    return;
                }
                Err(e) => {
                    // one bad frame must not take down replies still in
                    // flight on the same stream
                    tracing::error!("frame read failed: {e}");
                }
            }
        }
    }
}

fn is_closed_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
    )
}
