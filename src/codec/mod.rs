//! Schema-driven binary codec.
//!
//! Three layers, bottom up:
//!
//! - [`cursor`]: position-tracked, bounds-checked Big Endian primitives
//! - [`schema`]: validated message/type descriptions
//! - [`engine`]: the field-rule engine mapping schemas + values to bytes
//!
//! [`json`] loads the dataplane's published API-definition JSON into schemas
//! so the engine can be used against a live dataplane without generated code.

pub mod cursor;
pub mod engine;
pub mod json;
pub mod schema;

pub use cursor::{DecodeCursor, EncodeCursor};
pub use engine::{decode, decode_union, encode, wire_size, Value};
pub use json::{load_module, ApiMessage, ApiModule};
pub use schema::{
    AliasSchema, EnumSchema, Field, MessageKind, ScalarKind, StructSchema, TypeRef, UnionSchema,
};
