//! Error types for vapi-client.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum VapiError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API socket file does not exist.
    #[error("API socket not found at {0}")]
    SocketMissing(PathBuf),

    /// Connecting to the socket failed, including the seqpacket retry.
    #[error("connecting to {path} failed: {source}")]
    Dial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dataplane rejected the registration request.
    #[error("client registration failed: retval {retval}")]
    RegistrationFailed { retval: i32 },

    /// No registration reply arrived within the connect timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The registration reply did not have the expected shape.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame header could not be read in full.
    #[error("truncated frame header: got {got} of {want} bytes")]
    TruncatedHeader { got: usize, want: usize },

    /// An outbound payload below the 10-byte minimum.
    ///
    /// Bytes [2:10) of every request payload are rewritten in place with
    /// client_index and context, so shorter payloads cannot be framed.
    #[error("payload too short: {len} bytes, minimum {min}")]
    PayloadTooShort { len: usize, min: usize },

    /// The inbound stream is no longer frame-aligned.
    #[error("stream desynchronized: header claims {claimed} byte payload (max {max})")]
    Desynchronized { claimed: u32, max: u32 },

    /// Codec access past the end of the underlying buffer.
    #[error("codec out of range: need {need} bytes at offset {offset}, buffer holds {len}")]
    OutOfRange {
        offset: usize,
        need: usize,
        len: usize,
    },

    /// Message lookup missed: the dataplane does not support this message.
    #[error("unknown message {name} (crc {crc})")]
    UnknownMessage { name: String, crc: String },

    /// A schema violates a build-time invariant.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A value does not match the shape its schema requires.
    #[error("value does not match schema: {0}")]
    ValueMismatch(String),

    /// JSON parse error while loading an API definition.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A syntactically valid JSON API definition with an unexpected layout.
    #[error("malformed API definition: {0}")]
    MalformedApiDefinition(String),
}

/// Result type alias using VapiError.
pub type Result<T> = std::result::Result<T, VapiError>;
