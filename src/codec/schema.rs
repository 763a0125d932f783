//! Message schema model.
//!
//! A [`StructSchema`] is an ordered list of [`Field`] descriptors; field order
//! is wire order and is never re-sorted. Nested types ([`StructSchema`],
//! [`UnionSchema`], [`EnumSchema`], [`AliasSchema`]) are shared behind `Arc`
//! so one definition can appear in many messages.
//!
//! Schemas are validated when built: sizing strategies are checked per field,
//! `size_from` references are resolved to field indices up front, and union
//! blob sizes are fixed once here rather than at encode time.

use std::sync::Arc;

use crate::error::{Result, VapiError};

/// Scalar wire types. All fixed width, Big Endian, two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F64,
    Bool,
}

impl ScalarKind {
    /// Encoded width in bytes.
    pub const fn wire_size(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 | ScalarKind::Bool => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    /// Whether this kind can carry an array length.
    pub const fn is_integer(self) -> bool {
        !matches!(self, ScalarKind::F64 | ScalarKind::Bool)
    }
}

/// Reference to a field's type. Exactly one alternative by construction.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Scalar(ScalarKind),
    String,
    Struct(Arc<StructSchema>),
    Union(Arc<UnionSchema>),
    Enum(Arc<EnumSchema>),
    Alias(Arc<AliasSchema>),
}

impl TypeRef {
    /// Wire size when this type always occupies the same number of bytes.
    ///
    /// `None` for strings and for structs containing any variably-sized
    /// field; union alternatives must resolve to `Some`.
    pub fn fixed_wire_size(&self) -> Option<usize> {
        match self {
            TypeRef::Scalar(k) => Some(k.wire_size()),
            TypeRef::String => None,
            TypeRef::Struct(s) => s.fixed_wire_size(),
            TypeRef::Union(u) => Some(u.size()),
            TypeRef::Enum(e) => Some(e.backing().wire_size()),
            TypeRef::Alias(a) => a
                .target()
                .fixed_wire_size()
                .map(|s| s * a.length().unwrap_or(1)),
        }
    }
}

/// One field of a message or nested record.
///
/// For an array field, `ty` is the element type and exactly one sizing
/// strategy applies: `fixed_length` (count baked into the layout), `size_from`
/// (count carried by an earlier sibling field), or neither (4-byte count on
/// the wire ahead of the elements). A non-array string uses `fixed_length` as
/// its byte width, or a 4-byte length prefix when unset.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub is_array: bool,
    pub fixed_length: Option<usize>,
    pub size_from: Option<String>,
}

impl Field {
    pub fn scalar(name: &str, kind: ScalarKind) -> Self {
        Self::plain(name, TypeRef::Scalar(kind))
    }

    /// Length-prefixed string.
    pub fn string(name: &str) -> Self {
        Self::plain(name, TypeRef::String)
    }

    /// String occupying exactly `width` bytes on the wire.
    pub fn fixed_string(name: &str, width: usize) -> Self {
        Self {
            fixed_length: Some(width),
            ..Self::plain(name, TypeRef::String)
        }
    }

    pub fn nested(name: &str, schema: Arc<StructSchema>) -> Self {
        Self::plain(name, TypeRef::Struct(schema))
    }

    pub fn union(name: &str, schema: Arc<UnionSchema>) -> Self {
        Self::plain(name, TypeRef::Union(schema))
    }

    pub fn enumeration(name: &str, schema: Arc<EnumSchema>) -> Self {
        Self::plain(name, TypeRef::Enum(schema))
    }

    pub fn alias(name: &str, schema: Arc<AliasSchema>) -> Self {
        Self::plain(name, TypeRef::Alias(schema))
    }

    /// Array of exactly `len` elements, no count on the wire.
    pub fn fixed_array(name: &str, ty: TypeRef, len: usize) -> Self {
        Self {
            is_array: true,
            fixed_length: Some(len),
            ..Self::plain(name, ty)
        }
    }

    /// Array whose count is carried by the earlier sibling `count_field`.
    pub fn sized_array(name: &str, ty: TypeRef, count_field: &str) -> Self {
        Self {
            is_array: true,
            size_from: Some(count_field.to_string()),
            ..Self::plain(name, ty)
        }
    }

    /// Array preceded by its own 4-byte element count.
    pub fn prefixed_array(name: &str, ty: TypeRef) -> Self {
        Self {
            is_array: true,
            ..Self::plain(name, ty)
        }
    }

    fn plain(name: &str, ty: TypeRef) -> Self {
        Self {
            name: name.to_string(),
            ty,
            is_array: false,
            fixed_length: None,
            size_from: None,
        }
    }

    /// Wire size when this field always occupies the same number of bytes.
    pub(crate) fn fixed_wire_size(&self) -> Option<usize> {
        if self.is_array {
            let len = self.fixed_length?;
            return self.ty.fixed_wire_size().map(|s| s * len);
        }
        match &self.ty {
            TypeRef::String => self.fixed_length,
            ty => ty.fixed_wire_size(),
        }
    }
}

/// Advisory message role, derived structurally from the field list.
///
/// Never load-bearing for the wire format; used for direction-of-flow
/// assumptions and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Reply,
    Event,
    Other,
}

/// Ordered field list of a message or nested record.
#[derive(Debug)]
pub struct StructSchema {
    name: String,
    fields: Vec<Field>,
    /// Per field: index of the array this field carries the count for.
    counts_array: Vec<Option<usize>>,
    /// Per field: index of the sibling carrying this array's count.
    count_source: Vec<Option<usize>>,
}

impl StructSchema {
    /// Build and validate a schema.
    pub fn new(name: &str, fields: Vec<Field>) -> Result<Arc<Self>> {
        let mut counts_array = vec![None; fields.len()];
        let mut count_source = vec![None; fields.len()];

        for (idx, field) in fields.iter().enumerate() {
            let err = |msg: String| {
                Err(VapiError::InvalidSchema(format!(
                    "{name}.{}: {msg}",
                    field.name
                )))
            };

            if field.fixed_length == Some(0) {
                return err("fixed_length must be positive".into());
            }
            if field.fixed_length.is_some() && field.size_from.is_some() {
                return err("fixed_length and size_from are mutually exclusive".into());
            }
            if !field.is_array {
                if field.size_from.is_some() {
                    return err("size_from requires an array field".into());
                }
                if field.fixed_length.is_some() && !matches!(field.ty, TypeRef::String) {
                    return err("fixed_length on a non-array field requires a string".into());
                }
            }

            if let Some(source_name) = &field.size_from {
                let source = fields[..idx]
                    .iter()
                    .position(|f| &f.name == source_name);
                let Some(source) = source else {
                    return err(format!(
                        "size_from references {source_name:?}, which is not an earlier field"
                    ));
                };
                let ok = !fields[source].is_array
                    && matches!(fields[source].ty, TypeRef::Scalar(k) if k.is_integer());
                if !ok {
                    return err(format!(
                        "size_from field {source_name:?} must be an integer scalar"
                    ));
                }
                if counts_array[source].is_some() {
                    return err(format!("size_from field {source_name:?} already sizes an array"));
                }
                counts_array[source] = Some(idx);
                count_source[idx] = Some(source);
            }
        }

        Ok(Arc::new(Self {
            name: name.to_string(),
            fields,
            counts_array,
            count_source,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Index of the array sized by field `idx`, if it is a count carrier.
    pub(crate) fn array_counted_by(&self, idx: usize) -> Option<usize> {
        self.counts_array[idx]
    }

    /// Index of the field carrying the count for array field `idx`.
    pub(crate) fn count_source_of(&self, idx: usize) -> Option<usize> {
        self.count_source[idx]
    }

    /// Wire size when every field is fixed-size, else `None`.
    pub fn fixed_wire_size(&self) -> Option<usize> {
        self.fields
            .iter()
            .map(Field::fixed_wire_size)
            .try_fold(0usize, |acc, s| s.map(|s| acc + s))
    }

    /// Classify this message's role from its leading field names.
    ///
    /// Field 0 is the message id; a request carries `client_index` then
    /// `context`, a reply carries `context` alone, an event carries
    /// `client_index` without a following `context`.
    pub fn message_kind(&self) -> MessageKind {
        let name_at = |i: usize| self.fields.get(i).map(|f| f.name.as_str());
        match (name_at(1), name_at(2)) {
            (Some("client_index"), Some("context")) => MessageKind::Request,
            (Some("context"), _) => MessageKind::Reply,
            (Some("client_index"), _) => MessageKind::Event,
            _ => MessageKind::Other,
        }
    }
}

/// Named alternatives sharing one fixed-size backing blob.
///
/// The wire format carries no discriminant: writing alternative A and reading
/// alternative B is a caller error, matching the dataplane's own semantics.
#[derive(Debug)]
pub struct UnionSchema {
    name: String,
    alternatives: Vec<(String, TypeRef)>,
    size: usize,
}

impl UnionSchema {
    /// Build a union; every alternative must have a fixed wire size, and the
    /// blob size is the maximum of them.
    pub fn new(name: &str, alternatives: Vec<(String, TypeRef)>) -> Result<Arc<Self>> {
        if alternatives.is_empty() {
            return Err(VapiError::InvalidSchema(format!(
                "union {name} has no alternatives"
            )));
        }
        let mut size = 0;
        for (alt_name, ty) in &alternatives {
            let Some(alt_size) = ty.fixed_wire_size() else {
                return Err(VapiError::InvalidSchema(format!(
                    "union {name}.{alt_name} is not fixed-size"
                )));
            };
            size = size.max(alt_size);
        }
        Ok(Arc::new(Self {
            name: name.to_string(),
            alternatives,
            size,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blob size: the maximum alternative size, fixed at build time.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alternatives(&self) -> &[(String, TypeRef)] {
        &self.alternatives
    }

    /// Look up an alternative by name.
    pub fn alternative(&self, name: &str) -> Option<&TypeRef> {
        self.alternatives
            .iter()
            .find(|(alt, _)| alt == name)
            .map(|(_, ty)| ty)
    }
}

/// Name-to-integer mapping backed by one scalar width.
#[derive(Debug)]
pub struct EnumSchema {
    name: String,
    backing: ScalarKind,
    members: Vec<(String, u64)>,
}

impl EnumSchema {
    pub fn new(name: &str, backing: ScalarKind, members: Vec<(String, u64)>) -> Result<Arc<Self>> {
        if !backing.is_integer() {
            return Err(VapiError::InvalidSchema(format!(
                "enum {name} backing type must be an integer scalar"
            )));
        }
        Ok(Arc::new(Self {
            name: name.to_string(),
            backing,
            members,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backing(&self) -> ScalarKind {
        self.backing
    }

    pub fn value_of(&self, member: &str) -> Option<u64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|&(_, v)| v)
    }

    pub fn name_of(&self, value: u64) -> Option<&str> {
        self.members
            .iter()
            .find(|&&(_, v)| v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// A named shorthand for another type, optionally repeated a fixed number of
/// times (for example a 4-byte address alias over `u8`).
#[derive(Debug)]
pub struct AliasSchema {
    name: String,
    target: TypeRef,
    length: Option<usize>,
}

impl AliasSchema {
    pub fn new(name: &str, target: TypeRef, length: Option<usize>) -> Result<Arc<Self>> {
        if length == Some(0) {
            return Err(VapiError::InvalidSchema(format!(
                "alias {name} length must be positive"
            )));
        }
        Ok(Arc::new(Self {
            name: name.to_string(),
            target,
            length,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TypeRef {
        &self.target
    }

    pub fn length(&self) -> Option<usize> {
        self.length
    }
}
