//! Wire format encoding and decoding.
//!
//! Implements the 16-byte frame header:
//!
//! ```text
//! ┌──────────┬────────────────────────┬──────────┬──────────┐
//! │ Msg ID   │ (reserved, zeroed)     │ Length   │ (unused) │
//! │ 2 bytes  │ 6 bytes                │ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│                        │ uint32 BE│          │
//! └──────────┴────────────────────────┴──────────┴──────────┘
//! ```
//!
//! Only the message id at [0:2) and the payload length at [8:12) are
//! meaningful to this layer; the remaining bytes exist for historical wire
//! compatibility, are written as zero, and are never interpreted on read.
//! All multi-byte integers are Big Endian.

use bytes::Bytes;

use crate::error::{Result, VapiError};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Byte range of the payload length inside the header.
const LENGTH_RANGE: std::ops::Range<usize> = 8..12;

/// Minimum outbound request payload size.
///
/// Bytes [2:10) of a request payload are rewritten in place with
/// client_index and context before framing.
pub const MIN_PAYLOAD_SIZE: usize = 10;

/// Buffered reader/writer capacity around the raw socket.
pub const BUF_CAPACITY: usize = 4096;

/// Upper bound on a sane payload length (64 MB).
///
/// A header claiming more than this means the stream is no longer
/// frame-aligned and the connection must be torn down.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Message id of the registration request.
///
/// A protocol constant rather than a table lookup: the message table does
/// not exist until the registration reply has been processed.
pub const REGISTER_CLIENT_MSG_ID: u16 = 15;

/// Context tag carried by the registration request, echoed in the reply.
/// Non-zero so the reply is distinguishable before any table exists.
pub const REGISTER_CONTEXT: u32 = 0x5641_5049;

/// Name prefix of the graceful client-removal message, whose id is recorded
/// from the handshake table.
pub const DELETE_CLIENT_PREFIX: &str = "sockclnt_delete";

/// Width of a message-table name entry on the wire.
pub const TABLE_NAME_LEN: usize = 64;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Numeric message id assigned by the dataplane.
    pub msg_id: u16,
    /// Payload length in bytes; the payload is always read to exactly this
    /// length, never to EOF.
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(msg_id: u16, payload_length: u32) -> Self {
        Self {
            msg_id,
            payload_length,
        }
    }

    /// Encode to a fresh header buffer (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into an existing buffer, overwriting all 16 bytes.
    ///
    /// Reserved bytes are zeroed, so a reused buffer never leaks state from
    /// a previous frame.
    pub fn encode_into(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf.fill(0);
        buf[0..2].copy_from_slice(&self.msg_id.to_be_bytes());
        buf[LENGTH_RANGE].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode from bytes, ignoring the reserved regions.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(VapiError::TruncatedHeader {
                got: buf.len(),
                want: HEADER_SIZE,
            });
        }
        Ok(Self {
            msg_id: u16::from_be_bytes([buf[0], buf[1]]),
            payload_length: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// One complete frame off the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn msg_id(&self) -> u16 {
        self.header.msg_id
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
