//! Registration handshake messages.
//!
//! The first exchange on a new connection registers the client and returns
//! the message-id table. Both messages are ordinary schema-described
//! messages encoded and decoded by the field-rule engine; the only special
//! case is that the request's numeric id is a protocol constant, because no
//! table exists yet to look it up in.

use std::sync::{Arc, OnceLock};

use crate::codec::{self, Field, ScalarKind, StructSchema, Value};
use crate::error::{Result, VapiError};
use crate::protocol::message_table::MessageTable;
use crate::protocol::wire_format::{REGISTER_CLIENT_MSG_ID, REGISTER_CONTEXT, TABLE_NAME_LEN};

/// Parsed registration reply.
#[derive(Debug)]
pub struct HandshakeReply {
    /// Client index assigned by the dataplane.
    pub client_index: u32,
    /// Message-id table for the rest of the connection.
    pub table: MessageTable,
}

/// Schema of the registration request.
pub fn register_request_schema() -> &'static Arc<StructSchema> {
    static SCHEMA: OnceLock<Arc<StructSchema>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        StructSchema::new(
            "sockclnt_create",
            vec![
                Field::scalar("_vl_msg_id", ScalarKind::U16),
                Field::scalar("client_index", ScalarKind::U32),
                Field::scalar("context", ScalarKind::U32),
                Field::fixed_string("name", TABLE_NAME_LEN),
            ],
        )
        .expect("register request schema is valid")
    })
}

/// Schema of the registration reply, including the message table.
pub fn register_reply_schema() -> &'static Arc<StructSchema> {
    static SCHEMA: OnceLock<Arc<StructSchema>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let entry = StructSchema::new(
            "message_table_entry",
            vec![
                Field::scalar("index", ScalarKind::U16),
                Field::fixed_string("name", TABLE_NAME_LEN),
            ],
        )
        .expect("table entry schema is valid");
        StructSchema::new(
            "sockclnt_create_reply",
            vec![
                Field::scalar("_vl_msg_id", ScalarKind::U16),
                Field::scalar("context", ScalarKind::U32),
                Field::scalar("response", ScalarKind::I32),
                Field::scalar("index", ScalarKind::U32),
                Field::scalar("count", ScalarKind::U32),
                Field::sized_array("message_table", codec::TypeRef::Struct(entry), "count"),
            ],
        )
        .expect("register reply schema is valid")
    })
}

/// Encode the registration request payload for `client_name`.
///
/// The context field carries the reserved non-zero tag; client_index is
/// zero, since none has been assigned yet.
pub fn build_register_request(client_name: &str) -> Result<Vec<u8>> {
    let value = Value::Struct(vec![
        Value::U16(REGISTER_CLIENT_MSG_ID),
        Value::U32(0),
        Value::U32(REGISTER_CONTEXT),
        Value::String(client_name.to_string()),
    ]);
    codec::encode(register_request_schema(), &value)
}

/// Decode a registration reply payload and build the message table.
pub fn parse_register_reply(payload: &[u8]) -> Result<HandshakeReply> {
    let value = codec::decode(register_reply_schema(), payload)?;
    let Value::Struct(fields) = value else {
        return Err(shape_error("reply is not a struct"));
    };

    let context = field_u32(&fields, 1)?;
    if context != REGISTER_CONTEXT {
        return Err(shape_error(&format!(
            "reply context {context:#x} does not match the registration tag"
        )));
    }

    let response = match fields.get(2) {
        Some(Value::I32(v)) => *v,
        _ => return Err(shape_error("missing response code")),
    };
    if response != 0 {
        return Err(VapiError::RegistrationFailed { retval: response });
    }

    let client_index = field_u32(&fields, 3)?;
    let Some(Value::Array(entries)) = fields.get(5) else {
        return Err(shape_error("missing message table"));
    };

    let mut raw = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Struct(entry_fields) = entry else {
            return Err(shape_error("table entry is not a struct"));
        };
        let id = match entry_fields.first() {
            Some(Value::U16(v)) => *v,
            _ => return Err(shape_error("table entry is missing its id")),
        };
        let name = match entry_fields.get(1) {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(shape_error("table entry is missing its name")),
        };
        raw.push((name, id));
    }

    Ok(HandshakeReply {
        client_index,
        table: MessageTable::from_raw_entries(raw),
    })
}

fn field_u32(fields: &[Value], idx: usize) -> Result<u32> {
    match fields.get(idx) {
        Some(Value::U32(v)) => Ok(*v),
        _ => Err(shape_error("missing u32 field")),
    }
}

fn shape_error(msg: &str) -> VapiError {
    VapiError::Handshake(msg.to_string())
}
