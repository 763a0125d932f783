//! # vapi-client
//!
//! Rust client for a vector-packet-processing dataplane's binary control
//! API over a Unix-domain socket.
//!
//! ## Architecture
//!
//! - **Transport** (`transport`, `client`): socket discovery, the
//!   registration handshake, length-framed reads/writes, and the background
//!   read loop that hands inbound frames to a callback.
//! - **Codec** (`codec`): the schema-driven binary engine turning typed
//!   field lists into tightly packed Big Endian bytes and back, including
//!   sibling-sized arrays, fixed NUL-padded strings and fixed-size union
//!   blobs.
//!
//! The handshake learns a numeric id for every message the dataplane
//! supports; afterwards callers encode payloads with the codec, look the id
//! up by `(name, crc)`, and exchange frames over one shared connection.
//!
//! ## Example
//!
//! ```ignore
//! use vapi_client::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder()
//!         .client_name("my-tool")
//!         .on_message(|msg_id, payload| {
//!             println!("reply {msg_id}: {} bytes", payload.len());
//!         })
//!         .connect()
//!         .await
//!         .unwrap();
//!
//!     client.disconnect().await.unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{Client, ClientBuilder, MessageCallback};
pub use config::ClientConfig;
pub use error::{Result, VapiError};
