//! Runtime message-id table.
//!
//! The dataplane assigns numeric ids to message types at registration time;
//! the table maps the stable `name_crc` string key to that id for the
//! lifetime of one connection. Built once from the handshake reply and
//! immutable afterwards, so concurrent readers need no locking.
//!
//! A lookup is by the exact `(name, crc)` pair: a schema/dataplane version
//! mismatch surfaces as a typed unknown-message error instead of a silent
//! miscast onto a different message layout.

use std::collections::HashMap;

use crate::error::{Result, VapiError};
use crate::protocol::wire_format::DELETE_CLIENT_PREFIX;

/// Trailing control byte some table entries carry after their name.
const NAME_TRAILER: char = '\x13';

/// Immutable `(name, crc) -> numeric id` mapping learned at handshake time.
#[derive(Debug, Default)]
pub struct MessageTable {
    by_name: HashMap<String, u16>,
    by_id: HashMap<u16, String>,
    delete_client_id: Option<u16>,
}

impl MessageTable {
    /// Build the table from raw handshake entries.
    ///
    /// Each raw name is cleaned with [`clean_message_name`]; the entry whose
    /// name starts with the protocol-known delete-client prefix is recorded
    /// for graceful teardown.
    pub fn from_raw_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, u16)>,
    {
        let mut table = Self::default();
        for (raw_name, id) in entries {
            let name = clean_message_name(&raw_name);
            if table.delete_client_id.is_none() && name.starts_with(DELETE_CLIENT_PREFIX) {
                table.delete_client_id = Some(id);
            }
            table.by_id.insert(id, name.clone());
            table.by_name.insert(name, id);
        }
        table
    }

    /// Numeric id for `(name, crc)`, or the typed unknown-message error.
    pub fn lookup(&self, name: &str, crc: &str) -> Result<u16> {
        self.by_name
            .get(&format!("{name}_{crc}"))
            .copied()
            .ok_or_else(|| VapiError::UnknownMessage {
                name: name.to_string(),
                crc: crc.to_string(),
            })
    }

    /// Reverse lookup used when classifying inbound frames in logs.
    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Id of the graceful client-removal message, when the dataplane
    /// advertises one.
    pub fn delete_client_id(&self) -> Option<u16> {
        self.delete_client_id
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Normalize a raw table name: keep everything up to the first NUL, then
/// strip one trailing `0x13` control byte.
pub fn clean_message_name(raw: &str) -> String {
    let head = raw.split('\0').next().unwrap_or_default();
    head.strip_suffix(NAME_TRAILER).unwrap_or(head).to_string()
}
