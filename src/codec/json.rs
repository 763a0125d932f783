//! Loader for dataplane API-definition JSON.
//!
//! The dataplane publishes one JSON document per API module. Type, union and
//! message definitions are positional arrays (`["name", [field], [field],
//! ...]`), enums carry a trailing `{"enumtype": ...}` object, messages a
//! trailing `{"crc": "0x..."}` object, and aliases are an object keyed by
//! name. Field entries are `[type, name]`, `[type, name, length]` (0 means
//! variably sized) or `[type, name, 0, count_field]` for arrays sized by a
//! sibling.
//!
//! Definitions may reference each other in any order; resolution iterates to
//! a fixpoint and reports the leftover names when references cannot be
//! satisfied.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::codec::schema::{
    AliasSchema, EnumSchema, Field, ScalarKind, StructSchema, TypeRef, UnionSchema,
};
use crate::error::{Result, VapiError};

/// One message definition: schema plus the crc that, together with the name,
/// keys the runtime message-id lookup.
#[derive(Debug, Clone)]
pub struct ApiMessage {
    pub name: String,
    /// Hex crc without the `0x` prefix, e.g. `"51077d14"`.
    pub crc: String,
    pub schema: Arc<StructSchema>,
}

impl ApiMessage {
    /// The `name_crc` key form used by the message table.
    pub fn name_crc(&self) -> String {
        format!("{}_{}", self.name, self.crc)
    }
}

/// A loaded API module: messages by name, with their shared named types.
#[derive(Debug, Default)]
pub struct ApiModule {
    messages: HashMap<String, ApiMessage>,
}

impl ApiModule {
    pub fn message(&self, name: &str) -> Option<&ApiMessage> {
        self.messages.get(name)
    }

    pub fn messages(&self) -> impl Iterator<Item = &ApiMessage> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Parse one API module document.
pub fn load_module(json: &str) -> Result<ApiModule> {
    let root: Json = serde_json::from_str(json)?;
    let root = root
        .as_object()
        .ok_or_else(|| malformed("module root must be an object"))?;

    let mut resolver = Resolver::default();

    // enums reference nothing and can be registered up front
    for entry in list_of(root, "enums")? {
        let (name, schema) = parse_enum(entry)?;
        resolver.insert(name, TypeRef::Enum(schema));
    }

    let mut pending = Vec::new();
    for entry in list_of(root, "types")? {
        let (name, fields) = split_def(entry, "type")?;
        pending.push(Pending::Struct { name, fields });
    }
    for entry in list_of(root, "unions")? {
        let (name, alts) = split_def(entry, "union")?;
        pending.push(Pending::Union { name, alts });
    }
    if let Some(aliases) = root.get("aliases") {
        let aliases = aliases
            .as_object()
            .ok_or_else(|| malformed("aliases must be an object"))?;
        for (name, def) in aliases {
            pending.push(Pending::Alias {
                name: name.clone(),
                def: def.clone(),
            });
        }
    }

    // fixpoint over mutually-referencing definitions
    while !pending.is_empty() {
        let mut next = Vec::new();
        let mut progressed = false;
        for def in pending {
            if try_build(&def, &mut resolver)? {
                progressed = true;
            } else {
                next.push(def);
            }
        }
        if !progressed {
            let leftover: Vec<&str> = next.iter().map(Pending::name).collect();
            return Err(malformed(&format!(
                "unresolvable type references: {}",
                leftover.join(", ")
            )));
        }
        pending = next;
    }

    let mut module = ApiModule::default();
    for entry in list_of(root, "messages")? {
        let message = parse_message(entry, &resolver)?;
        module.messages.insert(message.name.clone(), message);
    }
    Ok(module)
}

/// Named-type registry with scalar fallbacks and `vl_api_X_t` unwrapping.
#[derive(Default)]
struct Resolver {
    named: HashMap<String, TypeRef>,
}

impl Resolver {
    fn insert(&mut self, name: String, ty: TypeRef) {
        self.named.insert(name, ty);
    }

    fn resolve(&self, ty: &str) -> Option<TypeRef> {
        let scalar = match ty {
            "u8" => Some(ScalarKind::U8),
            "i8" => Some(ScalarKind::I8),
            "u16" => Some(ScalarKind::U16),
            "i16" => Some(ScalarKind::I16),
            "u32" => Some(ScalarKind::U32),
            "i32" => Some(ScalarKind::I32),
            "u64" => Some(ScalarKind::U64),
            "i64" => Some(ScalarKind::I64),
            "f64" => Some(ScalarKind::F64),
            "bool" => Some(ScalarKind::Bool),
            _ => None,
        };
        if let Some(kind) = scalar {
            return Some(TypeRef::Scalar(kind));
        }
        if ty == "string" {
            return Some(TypeRef::String);
        }
        let key = ty
            .strip_prefix("vl_api_")
            .and_then(|s| s.strip_suffix("_t"))
            .unwrap_or(ty);
        self.named.get(key).cloned()
    }
}

enum Pending {
    Struct { name: String, fields: Vec<Json> },
    Union { name: String, alts: Vec<Json> },
    Alias { name: String, def: Json },
}

impl Pending {
    fn name(&self) -> &str {
        match self {
            Pending::Struct { name, .. }
            | Pending::Union { name, .. }
            | Pending::Alias { name, .. } => name,
        }
    }
}

/// Attempt to build one pending definition. `Ok(false)` means a reference is
/// not registered yet and the definition should be retried next round.
fn try_build(def: &Pending, resolver: &mut Resolver) -> Result<bool> {
    match def {
        Pending::Struct { name, fields } => {
            let mut built = Vec::with_capacity(fields.len());
            for entry in fields {
                match parse_field(entry, resolver)? {
                    Some(field) => built.push(field),
                    None => return Ok(false),
                }
            }
            let schema = StructSchema::new(name, built)?;
            resolver.insert(name.clone(), TypeRef::Struct(schema));
        }
        Pending::Union { name, alts } => {
            let mut built = Vec::with_capacity(alts.len());
            for entry in alts {
                let parts = entry
                    .as_array()
                    .ok_or_else(|| malformed("union alternative must be an array"))?;
                let (ty_name, alt_name) = type_and_name(parts)?;
                match resolver.resolve(ty_name) {
                    Some(ty) => built.push((alt_name.to_string(), ty)),
                    None => return Ok(false),
                }
            }
            let schema = UnionSchema::new(name, built)?;
            resolver.insert(name.clone(), TypeRef::Union(schema));
        }
        Pending::Alias { name, def } => {
            let obj = def
                .as_object()
                .ok_or_else(|| malformed("alias definition must be an object"))?;
            let ty_name = obj
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| malformed("alias is missing its type"))?;
            let Some(target) = resolver.resolve(ty_name) else {
                return Ok(false);
            };
            let length = match obj.get("length") {
                Some(len) => Some(
                    len.as_u64()
                        .ok_or_else(|| malformed("alias length must be an integer"))?
                        as usize,
                ),
                None => None,
            };
            let schema = AliasSchema::new(name, target, length)?;
            resolver.insert(name.clone(), TypeRef::Alias(schema));
        }
    }
    Ok(true)
}

fn parse_message(entry: &Json, resolver: &Resolver) -> Result<ApiMessage> {
    let parts = entry
        .as_array()
        .ok_or_else(|| malformed("message definition must be an array"))?;
    let name = parts
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("message definition is missing its name"))?;

    let mut fields = Vec::new();
    let mut crc = None;
    for part in &parts[1..] {
        match part {
            Json::Array(_) => {
                let field = parse_field(part, resolver)?.ok_or_else(|| {
                    malformed(&format!("message {name} references an unknown type"))
                })?;
                fields.push(field);
            }
            Json::Object(obj) => {
                crc = obj
                    .get("crc")
                    .and_then(Json::as_str)
                    .map(|c| c.trim_start_matches("0x").to_string());
            }
            _ => return Err(malformed(&format!("unexpected entry in message {name}"))),
        }
    }
    let crc = crc.ok_or_else(|| malformed(&format!("message {name} is missing its crc")))?;
    Ok(ApiMessage {
        name: name.to_string(),
        crc,
        schema: StructSchema::new(name, fields)?,
    })
}

/// Parse one `[type, name, ...]` field entry. `Ok(None)` when the type name
/// is not resolvable yet.
fn parse_field(entry: &Json, resolver: &Resolver) -> Result<Option<Field>> {
    let parts = entry
        .as_array()
        .ok_or_else(|| malformed("field definition must be an array"))?;
    let (ty_name, field_name) = type_and_name(parts)?;
    let Some(ty) = resolver.resolve(ty_name) else {
        return Ok(None);
    };

    let field = match parts.len() {
        2 => match ty {
            // a bare string field carries its own length prefix
            TypeRef::String => Field::string(field_name),
            ty => Field {
                name: field_name.to_string(),
                ty,
                is_array: false,
                fixed_length: None,
                size_from: None,
            },
        },
        3 => {
            let len = parts[2]
                .as_u64()
                .ok_or_else(|| malformed("field length must be an integer"))?
                as usize;
            match (ty, len) {
                (TypeRef::String, 0) => Field::string(field_name),
                (TypeRef::String, len) => Field::fixed_string(field_name, len),
                (ty, 0) => Field::prefixed_array(field_name, ty),
                (ty, len) => Field::fixed_array(field_name, ty, len),
            }
        }
        4 => {
            let count_field = parts[3]
                .as_str()
                .ok_or_else(|| malformed("array count reference must be a string"))?;
            Field::sized_array(field_name, ty, count_field)
        }
        n => {
            return Err(malformed(&format!(
                "field {field_name} has {n} entries, expected 2-4"
            )))
        }
    };
    Ok(Some(field))
}

fn parse_enum(entry: &Json) -> Result<(String, Arc<EnumSchema>)> {
    let parts = entry
        .as_array()
        .ok_or_else(|| malformed("enum definition must be an array"))?;
    let name = parts
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("enum definition is missing its name"))?;

    let mut members = Vec::new();
    let mut backing = ScalarKind::U32;
    for part in &parts[1..] {
        match part {
            Json::Array(member) => {
                let member_name = member
                    .first()
                    .and_then(Json::as_str)
                    .ok_or_else(|| malformed("enum member is missing its name"))?;
                let value = member
                    .get(1)
                    .and_then(Json::as_u64)
                    .ok_or_else(|| malformed("enum member is missing its value"))?;
                members.push((member_name.to_string(), value));
            }
            Json::Object(obj) => {
                if let Some(ty) = obj.get("enumtype").and_then(Json::as_str) {
                    backing = match ty {
                        "u8" => ScalarKind::U8,
                        "u16" => ScalarKind::U16,
                        "u32" => ScalarKind::U32,
                        "u64" => ScalarKind::U64,
                        other => {
                            return Err(malformed(&format!(
                                "enum {name} has unsupported backing type {other}"
                            )))
                        }
                    };
                }
            }
            _ => return Err(malformed(&format!("unexpected entry in enum {name}"))),
        }
    }
    Ok((name.to_string(), EnumSchema::new(name, backing, members)?))
}

fn split_def(entry: &Json, what: &str) -> Result<(String, Vec<Json>)> {
    let parts = entry
        .as_array()
        .ok_or_else(|| malformed(&format!("{what} definition must be an array")))?;
    let name = parts
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| malformed(&format!("{what} definition is missing its name")))?;
    Ok((name.to_string(), parts[1..].to_vec()))
}

fn type_and_name(parts: &[Json]) -> Result<(&str, &str)> {
    let ty = parts
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("field entry is missing its type"))?;
    let name = parts
        .get(1)
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("field entry is missing its name"))?;
    Ok((ty, name))
}

fn list_of<'a>(
    root: &'a serde_json::Map<String, Json>,
    key: &str,
) -> Result<std::slice::Iter<'a, Json>> {
    match root.get(key) {
        Some(value) => value
            .as_array()
            .map(|a| a.iter())
            .ok_or_else(|| malformed(&format!("{key} must be an array"))),
        None => Ok([].iter()),
    }
}

fn malformed(msg: &str) -> VapiError {
    VapiError::MalformedApiDefinition(msg.to_string())
}
