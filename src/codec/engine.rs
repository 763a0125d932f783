//! Schema-driven field-rule engine.
//!
//! One rule set turns a [`StructSchema`] plus a dynamic [`Value`] into wire
//! bytes and back. There is no per-message generated code and no second
//! reflective path; every message the client touches, including the
//! registration handshake itself, goes through these functions.
//!
//! Encoding computes the exact wire size first, allocates once, and then
//! writes through an [`EncodeCursor`], so `encode(v).len() == wire_size(v)`
//! holds by construction.

use crate::codec::cursor::{DecodeCursor, EncodeCursor};
use crate::codec::schema::{Field, ScalarKind, StructSchema, TypeRef, UnionSchema};
use crate::error::{Result, VapiError};

/// A dynamically-typed value shaped by some schema.
///
/// Structs hold one value per field in schema order. A decoded union field is
/// a [`Value::Blob`] of the raw backing bytes; [`decode_union`] re-reads a
/// blob as a chosen alternative.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F64(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<Value>),
    Enum(u64),
    Union {
        alternative: String,
        value: Box<Value>,
    },
    Blob(Vec<u8>),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::U16(_) => "u16",
            Value::I16(_) => "i16",
            Value::U32(_) => "u32",
            Value::I32(_) => "i32",
            Value::U64(_) => "u64",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Enum(_) => "enum",
            Value::Union { .. } => "union",
            Value::Blob(_) => "blob",
        }
    }

    fn as_struct(&self) -> Result<&[Value]> {
        match self {
            Value::Struct(fields) => Ok(fields),
            other => Err(mismatch("struct", other)),
        }
    }

    fn as_array(&self) -> Result<&[Value]> {
        match self {
            Value::Array(elems) => Ok(elems),
            other => Err(mismatch("array", other)),
        }
    }

    fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }
}

fn mismatch(want: &str, got: &Value) -> VapiError {
    VapiError::ValueMismatch(format!("expected {want}, got {}", got.kind_name()))
}

/// Exact number of bytes `value` occupies on the wire under `schema`.
pub fn wire_size(schema: &StructSchema, value: &Value) -> Result<usize> {
    struct_size(schema, value.as_struct()?)
}

/// Encode `value` under `schema` into exactly [`wire_size`] bytes.
pub fn encode(schema: &StructSchema, value: &Value) -> Result<Vec<u8>> {
    let size = wire_size(schema, value)?;
    let mut cur = EncodeCursor::new(size);
    encode_struct(schema, value.as_struct()?, &mut cur)?;
    debug_assert_eq!(cur.position(), size);
    Ok(cur.into_inner())
}

/// Decode one `schema`-shaped value from the front of `data`.
pub fn decode(schema: &StructSchema, data: &[u8]) -> Result<Value> {
    let mut cur = DecodeCursor::new(data);
    decode_struct(schema, &mut cur)
}

/// Re-read a union blob as the named alternative.
///
/// The wire format has no discriminant; reading a different alternative than
/// was written is the caller's responsibility. Trailing blob bytes beyond the
/// alternative's footprint are ignored.
pub fn decode_union(schema: &UnionSchema, blob: &[u8], alternative: &str) -> Result<Value> {
    let ty = schema.alternative(alternative).ok_or_else(|| {
        VapiError::ValueMismatch(format!(
            "union {} has no alternative {alternative:?}",
            schema.name()
        ))
    })?;
    let mut cur = DecodeCursor::new(blob);
    decode_type(ty, &mut cur)
}

// --- sizing ---

fn struct_size(schema: &StructSchema, values: &[Value]) -> Result<usize> {
    check_field_count(schema, values)?;
    let mut total = 0;
    for (idx, (field, value)) in schema.fields().iter().zip(values).enumerate() {
        total += if schema.array_counted_by(idx).is_some() {
            // count carrier: its scalar width, whatever the caller passed
            scalar_kind_of(&field.ty)?.wire_size()
        } else {
            field_size(field, value)?
        };
    }
    Ok(total)
}

fn field_size(field: &Field, value: &Value) -> Result<usize> {
    if field.is_array {
        let elems = value.as_array()?;
        return if let Some(n) = field.fixed_length {
            let mut total = 0;
            for i in 0..n {
                total += match elems.get(i) {
                    Some(e) => type_size(&field.ty, e)?,
                    None => type_size(&field.ty, &default_value(&field.ty))?,
                };
            }
            Ok(total)
        } else {
            let elems_total: usize = elems
                .iter()
                .map(|e| type_size(&field.ty, e))
                .sum::<Result<usize>>()?;
            let prefix = if field.size_from.is_some() { 0 } else { 4 };
            Ok(prefix + elems_total)
        };
    }
    match (&field.ty, field.fixed_length) {
        (TypeRef::String, Some(width)) => Ok(width),
        (TypeRef::String, None) => Ok(4 + value.as_str()?.len()),
        (ty, _) => type_size(ty, value),
    }
}

fn type_size(ty: &TypeRef, value: &Value) -> Result<usize> {
    match ty {
        TypeRef::Scalar(k) => Ok(k.wire_size()),
        TypeRef::String => Ok(4 + value.as_str()?.len()),
        TypeRef::Struct(s) => struct_size(s, value.as_struct()?),
        TypeRef::Union(u) => Ok(u.size()),
        TypeRef::Enum(e) => Ok(e.backing().wire_size()),
        TypeRef::Alias(a) => match a.length() {
            Some(n) => {
                let elems = value.as_array()?;
                let mut total = 0;
                for i in 0..n {
                    total += match elems.get(i) {
                        Some(e) => type_size(a.target(), e)?,
                        None => type_size(a.target(), &default_value(a.target()))?,
                    };
                }
                Ok(total)
            }
            None => type_size(a.target(), value),
        },
    }
}

// --- encoding ---

fn encode_struct(schema: &StructSchema, values: &[Value], cur: &mut EncodeCursor) -> Result<()> {
    check_field_count(schema, values)?;
    for (idx, (field, value)) in schema.fields().iter().zip(values).enumerate() {
        if let Some(array_idx) = schema.array_counted_by(idx) {
            // the engine owns this field: it carries the runtime length of
            // the sibling array, not whatever the caller supplied
            let count = values[array_idx].as_array()?.len() as u64;
            let kind = scalar_kind_of(&field.ty)?;
            if !integer_fits(kind, count) {
                return Err(VapiError::ValueMismatch(format!(
                    "{} holds {count} elements, more than its {} count field {} can carry",
                    schema.fields()[array_idx].name,
                    scalar_name(kind),
                    field.name
                )));
            }
            put_integer(cur, kind, count)?;
        } else {
            encode_field(field, value, cur)?;
        }
    }
    Ok(())
}

fn encode_field(field: &Field, value: &Value, cur: &mut EncodeCursor) -> Result<()> {
    if field.is_array {
        let elems = value.as_array()?;
        if let Some(n) = field.fixed_length {
            // exactly n elements regardless of the runtime collection size
            for i in 0..n {
                match elems.get(i) {
                    Some(e) => encode_type(&field.ty, e, cur)?,
                    None => encode_type(&field.ty, &default_value(&field.ty), cur)?,
                }
            }
        } else {
            if field.size_from.is_none() {
                cur.put_u32(elems.len() as u32)?;
            }
            for e in elems {
                encode_type(&field.ty, e, cur)?;
            }
        }
        return Ok(());
    }
    match (&field.ty, field.fixed_length) {
        (TypeRef::String, Some(width)) => cur.put_fixed_string(value.as_str()?, width),
        (TypeRef::String, None) => put_prefixed_string(cur, value.as_str()?),
        (ty, _) => encode_type(ty, value, cur),
    }
}

fn encode_type(ty: &TypeRef, value: &Value, cur: &mut EncodeCursor) -> Result<()> {
    match ty {
        TypeRef::Scalar(k) => encode_scalar(*k, value, cur),
        TypeRef::String => put_prefixed_string(cur, value.as_str()?),
        TypeRef::Struct(s) => encode_struct(s, value.as_struct()?, cur),
        TypeRef::Enum(e) => match value {
            Value::Enum(v) => put_integer(cur, e.backing(), *v),
            other => Err(mismatch("enum", other)),
        },
        TypeRef::Union(u) => encode_union(u, value, cur),
        TypeRef::Alias(a) => match a.length() {
            Some(n) => {
                let elems = value.as_array()?;
                for i in 0..n {
                    match elems.get(i) {
                        Some(e) => encode_type(a.target(), e, cur)?,
                        None => encode_type(a.target(), &default_value(a.target()), cur)?,
                    }
                }
                Ok(())
            }
            None => encode_type(a.target(), value, cur),
        },
    }
}

fn encode_scalar(kind: ScalarKind, value: &Value, cur: &mut EncodeCursor) -> Result<()> {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(v)) => cur.put_bool(*v),
        (ScalarKind::U8, Value::U8(v)) => cur.put_u8(*v),
        (ScalarKind::I8, Value::I8(v)) => cur.put_i8(*v),
        (ScalarKind::U16, Value::U16(v)) => cur.put_u16(*v),
        (ScalarKind::I16, Value::I16(v)) => cur.put_i16(*v),
        (ScalarKind::U32, Value::U32(v)) => cur.put_u32(*v),
        (ScalarKind::I32, Value::I32(v)) => cur.put_i32(*v),
        (ScalarKind::U64, Value::U64(v)) => cur.put_u64(*v),
        (ScalarKind::I64, Value::I64(v)) => cur.put_i64(*v),
        (ScalarKind::F64, Value::F64(v)) => cur.put_f64(*v),
        (_, other) => Err(mismatch(scalar_name(kind), other)),
    }
}

fn encode_union(u: &UnionSchema, value: &Value, cur: &mut EncodeCursor) -> Result<()> {
    match value {
        Value::Union { alternative, value } => {
            let ty = u.alternative(alternative).ok_or_else(|| {
                VapiError::ValueMismatch(format!(
                    "union {} has no alternative {alternative:?}",
                    u.name()
                ))
            })?;
            let start = cur.position();
            encode_type(ty, value, cur)?;
            // left-aligned alternative, rest of the blob stays zero
            cur.skip(u.size() - (cur.position() - start))
        }
        Value::Blob(bytes) => cur.put_fixed_bytes(bytes, u.size()),
        other => Err(mismatch("union", other)),
    }
}

fn put_prefixed_string(cur: &mut EncodeCursor, s: &str) -> Result<()> {
    cur.put_u32(s.len() as u32)?;
    cur.put_bytes(s.as_bytes())
}

fn put_integer(cur: &mut EncodeCursor, kind: ScalarKind, v: u64) -> Result<()> {
    match kind {
        ScalarKind::U8 => cur.put_u8(v as u8),
        ScalarKind::I8 => cur.put_i8(v as i8),
        ScalarKind::U16 => cur.put_u16(v as u16),
        ScalarKind::I16 => cur.put_i16(v as i16),
        ScalarKind::U32 => cur.put_u32(v as u32),
        ScalarKind::I32 => cur.put_i32(v as i32),
        ScalarKind::U64 => cur.put_u64(v),
        ScalarKind::I64 => cur.put_i64(v as i64),
        ScalarKind::F64 | ScalarKind::Bool => Err(VapiError::ValueMismatch(format!(
            "{} cannot carry an integer",
            scalar_name(kind)
        ))),
    }
}

// --- decoding ---

fn decode_struct(schema: &StructSchema, cur: &mut DecodeCursor<'_>) -> Result<Value> {
    let mut values = Vec::with_capacity(schema.fields().len());
    let mut counts: Vec<Option<u64>> = vec![None; schema.fields().len()];
    for (idx, field) in schema.fields().iter().enumerate() {
        if let Some(array_idx) = schema.array_counted_by(idx) {
            let (value, count) = get_integer(cur, scalar_kind_of(&field.ty)?)?;
            counts[array_idx] = Some(count);
            values.push(value);
        } else {
            // only arrays linked to an earlier count carrier consume one
            let count = schema.count_source_of(idx).and_then(|_| counts[idx]);
            values.push(decode_field(field, count, cur)?);
        }
    }
    Ok(Value::Struct(values))
}

fn decode_field(field: &Field, count: Option<u64>, cur: &mut DecodeCursor<'_>) -> Result<Value> {
    if field.is_array {
        let n = match (field.fixed_length, count) {
            (Some(n), _) => n,
            (None, Some(c)) => c as usize,
            (None, None) => cur.get_u32()? as usize,
        };
        // reject a count the remaining bytes cannot possibly satisfy before
        // allocating anything; variable-size elements are counted as at
        // least one byte each, so a hostile count can never reserve more
        // than the buffer holds
        let min_elem_size = field.ty.fixed_wire_size().unwrap_or(1).max(1);
        let need = n.saturating_mul(min_elem_size);
        if need > cur.remaining() {
            return Err(VapiError::OutOfRange {
                offset: cur.position(),
                need,
                len: cur.position() + cur.remaining(),
            });
        }
        let mut elems = Vec::with_capacity(n);
        for _ in 0..n {
            elems.push(decode_type(&field.ty, cur)?);
        }
        return Ok(Value::Array(elems));
    }
    match (&field.ty, field.fixed_length) {
        (TypeRef::String, Some(width)) => Ok(Value::String(cur.get_fixed_string(width)?)),
        (TypeRef::String, None) => get_prefixed_string(cur),
        (ty, _) => decode_type(ty, cur),
    }
}

fn decode_type(ty: &TypeRef, cur: &mut DecodeCursor<'_>) -> Result<Value> {
    match ty {
        TypeRef::Scalar(k) => decode_scalar(*k, cur),
        TypeRef::String => get_prefixed_string(cur),
        TypeRef::Struct(s) => decode_struct(s, cur),
        TypeRef::Enum(e) => {
            let (_, v) = get_integer(cur, e.backing())?;
            Ok(Value::Enum(v))
        }
        TypeRef::Union(u) => Ok(Value::Blob(cur.get_bytes(u.size())?.to_vec())),
        TypeRef::Alias(a) => match a.length() {
            Some(n) => {
                let mut elems = Vec::with_capacity(n);
                for _ in 0..n {
                    elems.push(decode_type(a.target(), cur)?);
                }
                Ok(Value::Array(elems))
            }
            None => decode_type(a.target(), cur),
        },
    }
}

fn decode_scalar(kind: ScalarKind, cur: &mut DecodeCursor<'_>) -> Result<Value> {
    Ok(match kind {
        ScalarKind::Bool => Value::Bool(cur.get_bool()?),
        ScalarKind::U8 => Value::U8(cur.get_u8()?),
        ScalarKind::I8 => Value::I8(cur.get_i8()?),
        ScalarKind::U16 => Value::U16(cur.get_u16()?),
        ScalarKind::I16 => Value::I16(cur.get_i16()?),
        ScalarKind::U32 => Value::U32(cur.get_u32()?),
        ScalarKind::I32 => Value::I32(cur.get_i32()?),
        ScalarKind::U64 => Value::U64(cur.get_u64()?),
        ScalarKind::I64 => Value::I64(cur.get_i64()?),
        ScalarKind::F64 => Value::F64(cur.get_f64()?),
    })
}

fn get_prefixed_string(cur: &mut DecodeCursor<'_>) -> Result<Value> {
    let n = cur.get_u32()? as usize;
    let raw = cur.get_bytes(n)?;
    Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
}

fn get_integer(cur: &mut DecodeCursor<'_>, kind: ScalarKind) -> Result<(Value, u64)> {
    Ok(match kind {
        ScalarKind::U8 => {
            let v = cur.get_u8()?;
            (Value::U8(v), v as u64)
        }
        ScalarKind::I8 => {
            let v = cur.get_i8()?;
            (Value::I8(v), v as u64)
        }
        ScalarKind::U16 => {
            let v = cur.get_u16()?;
            (Value::U16(v), v as u64)
        }
        ScalarKind::I16 => {
            let v = cur.get_i16()?;
            (Value::I16(v), v as u64)
        }
        ScalarKind::U32 => {
            let v = cur.get_u32()?;
            (Value::U32(v), v as u64)
        }
        ScalarKind::I32 => {
            let v = cur.get_i32()?;
            (Value::I32(v), v as u64)
        }
        ScalarKind::U64 => {
            let v = cur.get_u64()?;
            (Value::U64(v), v)
        }
        ScalarKind::I64 => {
            let v = cur.get_i64()?;
            (Value::I64(v), v as u64)
        }
        ScalarKind::F64 | ScalarKind::Bool => {
            return Err(VapiError::ValueMismatch(format!(
                "{} cannot carry an integer",
                scalar_name(kind)
            )))
        }
    })
}

// --- helpers ---

fn check_field_count(schema: &StructSchema, values: &[Value]) -> Result<()> {
    if values.len() != schema.fields().len() {
        return Err(VapiError::ValueMismatch(format!(
            "{} expects {} fields, got {}",
            schema.name(),
            schema.fields().len(),
            values.len()
        )));
    }
    Ok(())
}

fn scalar_kind_of(ty: &TypeRef) -> Result<ScalarKind> {
    match ty {
        TypeRef::Scalar(k) => Ok(*k),
        _ => Err(VapiError::ValueMismatch(
            "count field must be a scalar".to_string(),
        )),
    }
}

/// Whether `v` is representable in `kind` without truncation.
fn integer_fits(kind: ScalarKind, v: u64) -> bool {
    match kind {
        ScalarKind::U8 => v <= u8::MAX as u64,
        ScalarKind::I8 => v <= i8::MAX as u64,
        ScalarKind::U16 => v <= u16::MAX as u64,
        ScalarKind::I16 => v <= i16::MAX as u64,
        ScalarKind::U32 => v <= u32::MAX as u64,
        ScalarKind::I32 => v <= i32::MAX as u64,
        ScalarKind::U64 => true,
        ScalarKind::I64 => v <= i64::MAX as u64,
        ScalarKind::F64 | ScalarKind::Bool => false,
    }
}

fn scalar_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "bool",
        ScalarKind::U8 => "u8",
        ScalarKind::I8 => "i8",
        ScalarKind::U16 => "u16",
        ScalarKind::I16 => "i16",
        ScalarKind::U32 => "u32",
        ScalarKind::I32 => "i32",
        ScalarKind::U64 => "u64",
        ScalarKind::I64 => "i64",
        ScalarKind::F64 => "f64",
    }
}

/// Zero value for fixed-array padding.
fn default_value(ty: &TypeRef) -> Value {
    match ty {
        TypeRef::Scalar(k) => match k {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::U8 => Value::U8(0),
            ScalarKind::I8 => Value::I8(0),
            ScalarKind::U16 => Value::U16(0),
            ScalarKind::I16 => Value::I16(0),
            ScalarKind::U32 => Value::U32(0),
            ScalarKind::I32 => Value::I32(0),
            ScalarKind::U64 => Value::U64(0),
            ScalarKind::I64 => Value::I64(0),
            ScalarKind::F64 => Value::F64(0.0),
        },
        TypeRef::String => Value::String(String::new()),
        TypeRef::Struct(s) => Value::Struct(
            s.fields()
                .iter()
                .map(|f| {
                    if f.is_array {
                        Value::Array(Vec::new())
                    } else if matches!(f.ty, TypeRef::String) {
                        Value::String(String::new())
                    } else {
                        default_value(&f.ty)
                    }
                })
                .collect(),
        ),
        TypeRef::Union(_) => Value::Blob(Vec::new()),
        TypeRef::Enum(_) => Value::Enum(0),
        TypeRef::Alias(a) => match a.length() {
            Some(_) => Value::Array(Vec::new()),
            None => default_value(a.target()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::schema::{AliasSchema, EnumSchema, Field};

    fn scalar_schema() -> std::sync::Arc<StructSchema> {
        StructSchema::new(
            "scalars",
            vec![
                Field::scalar("a", ScalarKind::U8),
                Field::scalar("b", ScalarKind::I32),
                Field::scalar("c", ScalarKind::U64),
                Field::scalar("d", ScalarKind::F64),
                Field::scalar("e", ScalarKind::Bool),
            ],
        )
        .unwrap()
    }

    fn round_trip(schema: &StructSchema, value: Value) -> Value {
        let bytes = encode(schema, &value).unwrap();
        assert_eq!(bytes.len(), wire_size(schema, &value).unwrap());
        let decoded = decode(schema, &bytes).unwrap();
        // canonical values survive a second pass byte-identically
        assert_eq!(encode(schema, &decoded).unwrap(), bytes);
        decoded
    }

    #[test]
    fn test_scalar_round_trip() {
        let schema = scalar_schema();
        let value = Value::Struct(vec![
            Value::U8(7),
            Value::I32(-1000),
            Value::U64(1 << 40),
            Value::F64(3.25),
            Value::Bool(true),
        ]);
        assert_eq!(round_trip(&schema, value.clone()), value);
        assert_eq!(wire_size(&schema, &value).unwrap(), 1 + 4 + 8 + 8 + 1);
    }

    #[test]
    fn test_scalar_variant_mismatch() {
        let schema = scalar_schema();
        let value = Value::Struct(vec![
            Value::U16(7), // wrong width
            Value::I32(0),
            Value::U64(0),
            Value::F64(0.0),
            Value::Bool(false),
        ]);
        assert!(matches!(
            encode(&schema, &value).unwrap_err(),
            VapiError::ValueMismatch(_)
        ));
    }

    #[test]
    fn test_fixed_string_round_trip() {
        let schema = StructSchema::new("m", vec![Field::fixed_string("name", 16)]).unwrap();
        let value = Value::Struct(vec![Value::String("testclient".to_string())]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..10], b"testclient");
        assert!(bytes[10..].iter().all(|&b| b == 0));
        assert_eq!(decode(&schema, &bytes).unwrap(), value);
    }

    #[test]
    fn test_fixed_string_truncates() {
        let schema = StructSchema::new("m", vec![Field::fixed_string("name", 4)]).unwrap();
        let value = Value::Struct(vec![Value::String("overlong".to_string())]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes, b"over");
    }

    #[test]
    fn test_prefixed_string_round_trip() {
        let schema = StructSchema::new("m", vec![Field::string("name")]).unwrap();
        let value = Value::Struct(vec![Value::String("hello".to_string())]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes.len(), 4 + 5);
        assert_eq!(&bytes[..4], &5u32.to_be_bytes());
        assert_eq!(round_trip(&schema, value.clone()), value);
    }

    #[test]
    fn test_fixed_array_pads_and_truncates() {
        let schema = StructSchema::new(
            "m",
            vec![Field::fixed_array("data", TypeRef::Scalar(ScalarKind::U16), 4)],
        )
        .unwrap();

        // short input is padded with zeroes
        let short = Value::Struct(vec![Value::Array(vec![Value::U16(1), Value::U16(2)])]);
        let bytes = encode(&schema, &short).unwrap();
        assert_eq!(bytes, [0, 1, 0, 2, 0, 0, 0, 0]);
        assert_eq!(
            decode(&schema, &bytes).unwrap(),
            Value::Struct(vec![Value::Array(vec![
                Value::U16(1),
                Value::U16(2),
                Value::U16(0),
                Value::U16(0),
            ])])
        );

        // long input is truncated at the declared length
        let long = Value::Struct(vec![Value::Array(
            (0..9).map(|i| Value::U16(i)).collect(),
        )]);
        assert_eq!(encode(&schema, &long).unwrap().len(), 8);
    }

    #[test]
    fn test_size_from_array_uses_runtime_length() {
        let schema = StructSchema::new(
            "m",
            vec![
                Field::scalar("count", ScalarKind::U32),
                Field::sized_array("ids", TypeRef::Scalar(ScalarKind::U16), "count"),
            ],
        )
        .unwrap();

        // the caller's count value is ignored in favour of the array length
        let value = Value::Struct(vec![
            Value::U32(999),
            Value::Array(vec![Value::U16(10), Value::U16(20), Value::U16(30)]),
        ]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(&bytes[..4], &3u32.to_be_bytes());
        assert_eq!(bytes.len(), 4 + 3 * 2);

        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(
            decoded,
            Value::Struct(vec![
                Value::U32(3),
                Value::Array(vec![Value::U16(10), Value::U16(20), Value::U16(30)]),
            ])
        );
    }

    #[test]
    fn test_size_from_count_rejected_when_buffer_short() {
        let schema = StructSchema::new(
            "m",
            vec![
                Field::scalar("count", ScalarKind::U32),
                Field::sized_array("ids", TypeRef::Scalar(ScalarKind::U64), "count"),
            ],
        )
        .unwrap();
        // count claims 1000 elements, buffer holds none
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            decode(&schema, &bytes).unwrap_err(),
            VapiError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_hostile_count_with_variable_elements_rejected() {
        // element type has no fixed wire size, so the guard must fall back
        // to a minimum per-element footprint instead of allocating blindly
        let schema = StructSchema::new(
            "m",
            vec![
                Field::scalar("count", ScalarKind::U32),
                Field::sized_array("names", TypeRef::String, "count"),
            ],
        )
        .unwrap();
        let bytes = u32::MAX.to_be_bytes();
        assert!(matches!(
            decode(&schema, &bytes).unwrap_err(),
            VapiError::OutOfRange { .. }
        ));

        // same for the on-the-wire length prefix
        let schema = StructSchema::new(
            "m",
            vec![Field::prefixed_array("names", TypeRef::String)],
        )
        .unwrap();
        assert!(matches!(
            decode(&schema, &bytes).unwrap_err(),
            VapiError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_size_from_count_wider_than_carrier_rejected() {
        let schema = StructSchema::new(
            "m",
            vec![
                Field::scalar("count", ScalarKind::U8),
                Field::sized_array("ids", TypeRef::Scalar(ScalarKind::U16), "count"),
            ],
        )
        .unwrap();
        // 300 elements cannot be represented by the u8 count field; the
        // encoder must refuse rather than truncate the count
        let value = Value::Struct(vec![
            Value::U8(0),
            Value::Array((0..300u32).map(|i| Value::U16(i as u16)).collect()),
        ]);
        assert!(matches!(
            encode(&schema, &value).unwrap_err(),
            VapiError::ValueMismatch(_)
        ));

        // at the carrier's limit it still round-trips
        let value = Value::Struct(vec![
            Value::U8(0),
            Value::Array((0..255u32).map(|i| Value::U16(i as u16)).collect()),
        ]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes[0], 255);
        let decoded = decode(&schema, &bytes).unwrap();
        let Value::Struct(fields) = &decoded else {
            panic!("expected struct")
        };
        assert_eq!(fields[0], Value::U8(255));
    }

    #[test]
    fn test_prefixed_array_round_trip() {
        let schema = StructSchema::new(
            "m",
            vec![Field::prefixed_array("ids", TypeRef::Scalar(ScalarKind::U8))],
        )
        .unwrap();
        let value = Value::Struct(vec![Value::Array(vec![
            Value::U8(1),
            Value::U8(2),
            Value::U8(3),
        ])]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes, [0, 0, 0, 3, 1, 2, 3]);
        assert_eq!(round_trip(&schema, value.clone()), value);
    }

    #[test]
    fn test_nested_struct_round_trip() {
        let inner = StructSchema::new(
            "pair",
            vec![
                Field::scalar("x", ScalarKind::U16),
                Field::scalar("y", ScalarKind::U16),
            ],
        )
        .unwrap();
        let schema = StructSchema::new(
            "m",
            vec![
                Field::scalar("id", ScalarKind::U8),
                Field::nested("point", inner),
            ],
        )
        .unwrap();
        let value = Value::Struct(vec![
            Value::U8(1),
            Value::Struct(vec![Value::U16(3), Value::U16(4)]),
        ]);
        // nested records flatten in place, no inner length prefix
        assert_eq!(wire_size(&schema, &value).unwrap(), 1 + 4);
        assert_eq!(round_trip(&schema, value.clone()), value);
    }

    #[test]
    fn test_enum_round_trip() {
        let e = EnumSchema::new(
            "if_status",
            ScalarKind::U16,
            vec![("DOWN".to_string(), 0), ("UP".to_string(), 1)],
        )
        .unwrap();
        let schema = StructSchema::new("m", vec![Field::enumeration("status", e)]).unwrap();
        let value = Value::Struct(vec![Value::Enum(1)]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes, [0, 1]);
        assert_eq!(round_trip(&schema, value.clone()), value);
    }

    #[test]
    fn test_alias_round_trip() {
        let ip4 = AliasSchema::new("ip4_address", TypeRef::Scalar(ScalarKind::U8), Some(4)).unwrap();
        let schema = StructSchema::new("m", vec![Field::alias("addr", ip4)]).unwrap();
        let value = Value::Struct(vec![Value::Array(vec![
            Value::U8(10),
            Value::U8(0),
            Value::U8(0),
            Value::U8(1),
        ])]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes, [10, 0, 0, 1]);
        assert_eq!(round_trip(&schema, value.clone()), value);
    }

    fn address_union() -> std::sync::Arc<UnionSchema> {
        let ip4 = AliasSchema::new("ip4_address", TypeRef::Scalar(ScalarKind::U8), Some(4)).unwrap();
        UnionSchema::new(
            "address_union",
            vec![
                ("ip4".to_string(), TypeRef::Alias(ip4)),
                ("ip6".to_string(), TypeRef::Scalar(ScalarKind::U64)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_union_blob_size_and_zero_fill() {
        let u = address_union();
        assert_eq!(u.size(), 8);

        let schema = StructSchema::new("m", vec![Field::union("addr", u.clone())]).unwrap();
        // smallest alternative, blob padded to 8 bytes
        let value = Value::Struct(vec![Value::Union {
            alternative: "ip4".to_string(),
            value: Box::new(Value::Array(vec![
                Value::U8(192),
                Value::U8(168),
                Value::U8(0),
                Value::U8(1),
            ])),
        }]);
        let bytes = encode(&schema, &value).unwrap();
        assert_eq!(bytes, [192, 168, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_union_decode_each_alternative() {
        let u = address_union();
        let schema = StructSchema::new("m", vec![Field::union("addr", u.clone())]).unwrap();

        let value = Value::Struct(vec![Value::Union {
            alternative: "ip4".to_string(),
            value: Box::new(Value::Array(vec![
                Value::U8(1),
                Value::U8(2),
                Value::U8(3),
                Value::U8(4),
            ])),
        }]);
        let bytes = encode(&schema, &value).unwrap();

        // generic decode yields the raw blob
        let decoded = decode(&schema, &bytes).unwrap();
        let Value::Struct(fields) = &decoded else {
            panic!("expected struct")
        };
        let Value::Blob(blob) = &fields[0] else {
            panic!("expected blob")
        };
        assert_eq!(blob.as_slice(), &[1, 2, 3, 4, 0, 0, 0, 0]);

        // reading the written alternative back
        assert_eq!(
            decode_union(&u, blob, "ip4").unwrap(),
            Value::Array(vec![Value::U8(1), Value::U8(2), Value::U8(3), Value::U8(4)])
        );
        // reading the larger alternative from the same blob is well-defined:
        // trailing bytes beyond the small alternative's footprint are zero
        assert_eq!(
            decode_union(&u, blob, "ip6").unwrap(),
            Value::U64(0x0102_0304_0000_0000)
        );
        // the blob re-encodes byte-identically
        let re = encode(&schema, &Value::Struct(vec![Value::Blob(blob.clone())])).unwrap();
        assert_eq!(re, bytes);
    }

    #[test]
    fn test_union_unknown_alternative() {
        let u = address_union();
        assert!(matches!(
            decode_union(&u, &[0u8; 8], "mac").unwrap_err(),
            VapiError::ValueMismatch(_)
        ));
    }

    #[test]
    fn test_decode_truncated_buffer() {
        let schema = scalar_schema();
        let value = Value::Struct(vec![
            Value::U8(7),
            Value::I32(-1),
            Value::U64(1),
            Value::F64(0.5),
            Value::Bool(false),
        ]);
        let bytes = encode(&schema, &value).unwrap();
        assert!(matches!(
            decode(&schema, &bytes[..bytes.len() - 1]).unwrap_err(),
            VapiError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_field_count_mismatch() {
        let schema = scalar_schema();
        let value = Value::Struct(vec![Value::U8(7)]);
        assert!(matches!(
            wire_size(&schema, &value).unwrap_err(),
            VapiError::ValueMismatch(_)
        ));
    }
}
