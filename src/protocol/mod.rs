//! Protocol module - framing, handshake and message-id bookkeeping.
//!
//! - 16-byte frame header encoding/decoding and protocol constants
//! - pooled header buffers for allocation-free framing
//! - the registration handshake messages
//! - the per-connection message-id table

pub mod handshake;
pub mod header_pool;
pub mod message_table;
pub mod wire_format;

pub use handshake::{build_register_request, parse_register_reply, HandshakeReply};
pub use header_pool::{HeaderPool, HEADER_POOL_SIZE};
pub use message_table::{clean_message_name, MessageTable};
pub use wire_format::{
    Frame, FrameHeader, BUF_CAPACITY, DELETE_CLIENT_PREFIX, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    MIN_PAYLOAD_SIZE, REGISTER_CLIENT_MSG_ID, REGISTER_CONTEXT, TABLE_NAME_LEN,
};
