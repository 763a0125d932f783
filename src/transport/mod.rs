//! Transport module - socket discovery and dialing.
//!
//! Resolves the API socket path (with the legacy-path fallback), waits for
//! the socket file to appear, and dials it, retrying once with the
//! seqpacket flavor when the stream flavor is rejected.

mod socket;

pub use socket::{
    dial, resolve_socket_path, wait_for_socket, DEFAULT_SOCKET_PATH, LEGACY_SOCKET_PATH,
};
