//! Binary LCM encoding and decoding driven by struct descriptors
//!
//! All values are big-endian. A top-level message is prefixed with its 8-byte
//! fingerprint; nested structs are encoded inline without one.

use std::fmt;

use thiserror::Error;

use super::types::{Dimension, FieldType, Member, PrimitiveType, StructDef, TypeTable};

/// Nesting limit for self-referencing types
const MAX_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("fingerprint mismatch: expected {expected:#018x}, found {found:#018x}")]
    FingerprintMismatch { expected: u64, found: u64 },

    #[error("message truncated: needed {needed} bytes at offset {offset}, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("invalid string in field '{0}'")]
    InvalidString(String),

    #[error("invalid array length {length} from '{size_field}'")]
    InvalidLength { size_field: String, length: i64 },

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("struct nesting too deep")]
    TooDeep,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("array '{field}' has {actual} elements, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<FieldValue>),
    Struct(DecodedMessage),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Arrays longer than this are shortened when displayed
const DISPLAY_ARRAY_LIMIT: usize = 8;

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v:.4}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
            FieldValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().take(DISPLAY_ARRAY_LIMIT).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() > DISPLAY_ARRAY_LIMIT {
                    write!(f, ", ... ({} total)", items.len())?;
                }
                write!(f, "]")
            }
            FieldValue::Struct(msg) => write!(f, "<{}>", msg.type_name),
        }
    }
}

/// A fully decoded message: ordered field/value pairs
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Short type name, e.g. `mbot_imu_t`
    pub type_name: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl DecodedMessage {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Flatten nested structs into dotted names with display strings
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for (name, value) in &self.fields {
            let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
            match value {
                FieldValue::Struct(inner) => inner.flatten_into(&path, out),
                FieldValue::Array(items)
                    if items.first().is_some_and(|i| matches!(i, FieldValue::Struct(_))) =>
                {
                    for (i, item) in items.iter().take(DISPLAY_ARRAY_LIMIT).enumerate() {
                        if let FieldValue::Struct(inner) = item {
                            inner.flatten_into(&format!("{path}[{i}]"), out);
                        }
                    }
                }
                other => out.push((path, other.to_string())),
            }
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.data.len() - self.offset;
        if n > remaining {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: n,
                remaining,
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn primitive(&mut self, ty: PrimitiveType, field: &str) -> Result<FieldValue, DecodeError> {
        Ok(match ty {
            PrimitiveType::Int8 => FieldValue::Int(i8::from_be_bytes(self.array()?) as i64),
            PrimitiveType::Int16 => FieldValue::Int(i16::from_be_bytes(self.array()?) as i64),
            PrimitiveType::Int32 => FieldValue::Int(i32::from_be_bytes(self.array()?) as i64),
            PrimitiveType::Int64 => FieldValue::Int(i64::from_be_bytes(self.array()?)),
            PrimitiveType::Byte => FieldValue::Int(u8::from_be_bytes(self.array()?) as i64),
            PrimitiveType::Float => FieldValue::Float(f32::from_be_bytes(self.array()?) as f64),
            PrimitiveType::Double => FieldValue::Float(f64::from_be_bytes(self.array()?)),
            PrimitiveType::Boolean => FieldValue::Bool(i8::from_be_bytes(self.array()?) != 0),
            PrimitiveType::String => {
                let len = i32::from_be_bytes(self.array()?);
                if len <= 0 {
                    return Err(DecodeError::InvalidString(field.to_string()));
                }
                let bytes = self.take(len as usize)?;
                let (text, nul) = bytes.split_at(bytes.len() - 1);
                if nul[0] != 0 {
                    return Err(DecodeError::InvalidString(field.to_string()));
                }
                let text = std::str::from_utf8(text)
                    .map_err(|_| DecodeError::InvalidString(field.to_string()))?;
                FieldValue::Str(text.to_string())
            }
        })
    }
}

struct Decoder<'t> {
    table: &'t TypeTable,
}

impl Decoder<'_> {
    fn decode_struct(
        &self,
        reader: &mut Reader<'_>,
        def: &StructDef,
        depth: usize,
    ) -> Result<DecodedMessage, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let mut fields: Vec<(String, FieldValue)> = Vec::with_capacity(def.members.len());
        for member in &def.members {
            let lengths = member
                .dims
                .iter()
                .map(|dim| resolve_length(dim, &fields))
                .collect::<Result<Vec<_>, _>>()?;
            let value = self.decode_dims(reader, member, &lengths, depth)?;
            fields.push((member.name.clone(), value));
        }
        Ok(DecodedMessage {
            type_name: def.name.clone(),
            fields,
        })
    }

    fn decode_dims(
        &self,
        reader: &mut Reader<'_>,
        member: &Member,
        lengths: &[usize],
        depth: usize,
    ) -> Result<FieldValue, DecodeError> {
        match lengths.split_first() {
            None => self.decode_scalar(reader, member, depth),
            Some((&len, rest)) => {
                // Reject lengths the remaining input cannot possibly satisfy
                // before allocating for them
                if len > reader.data.len() - reader.offset {
                    return Err(DecodeError::Truncated {
                        offset: reader.offset,
                        needed: len,
                        remaining: reader.data.len() - reader.offset,
                    });
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.decode_dims(reader, member, rest, depth)?);
                }
                Ok(FieldValue::Array(items))
            }
        }
    }

    fn decode_scalar(
        &self,
        reader: &mut Reader<'_>,
        member: &Member,
        depth: usize,
    ) -> Result<FieldValue, DecodeError> {
        match &member.ty {
            FieldType::Primitive(p) => reader.primitive(*p, &member.name),
            FieldType::Struct(name) => {
                let def =
                    self.table.get(name).ok_or_else(|| DecodeError::UnknownType(name.clone()))?;
                Ok(FieldValue::Struct(self.decode_struct(reader, def, depth + 1)?))
            }
        }
    }
}

fn resolve_length(dim: &Dimension, fields: &[(String, FieldValue)]) -> Result<usize, DecodeError> {
    match dim {
        Dimension::Const(n) => Ok(*n),
        Dimension::Var(size_field) => {
            let length = fields
                .iter()
                .find(|(n, _)| n == size_field)
                .and_then(|(_, v)| v.as_i64())
                .unwrap_or(-1);
            usize::try_from(length).map_err(|_| DecodeError::InvalidLength {
                size_field: size_field.clone(),
                length,
            })
        }
    }
}

/// Decode `data` as the fully qualified type `full_name`.
///
/// Works on a private cursor and only returns a value once the whole message
/// decoded, so a failure part way through leaves nothing behind.
pub fn decode(
    table: &TypeTable,
    full_name: &str,
    data: &[u8],
) -> Result<DecodedMessage, DecodeError> {
    let def = table.get(full_name).ok_or_else(|| DecodeError::UnknownType(full_name.to_string()))?;
    let expected =
        table.fingerprint(full_name).ok_or_else(|| DecodeError::UnknownType(full_name.to_string()))?;

    let mut reader = Reader { data, offset: 0 };
    let found = u64::from_be_bytes(reader.array()?);
    if found != expected {
        return Err(DecodeError::FingerprintMismatch { expected, found });
    }

    Decoder { table }.decode_struct(&mut reader, def, 0)
}

struct Encoder<'t> {
    table: &'t TypeTable,
    out: Vec<u8>,
}

impl Encoder<'_> {
    fn encode_struct(&mut self, def: &StructDef, msg: &DecodedMessage) -> Result<(), EncodeError> {
        for member in &def.members {
            let value = msg
                .get(&member.name)
                .ok_or_else(|| EncodeError::MissingField(member.name.clone()))?;
            let lengths = member
                .dims
                .iter()
                .map(|dim| {
                    resolve_length(dim, &msg.fields).map_err(|_| EncodeError::TypeMismatch {
                        field: dim.size_token(),
                        expected: "non-negative integer".to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.encode_dims(member, value, &lengths)?;
        }
        Ok(())
    }

    fn encode_dims(
        &mut self,
        member: &Member,
        value: &FieldValue,
        lengths: &[usize],
    ) -> Result<(), EncodeError> {
        match lengths.split_first() {
            None => self.encode_scalar(member, value),
            Some((&len, rest)) => {
                let items = value.as_array().ok_or_else(|| EncodeError::TypeMismatch {
                    field: member.name.clone(),
                    expected: "array".to_string(),
                })?;
                if items.len() != len {
                    return Err(EncodeError::LengthMismatch {
                        field: member.name.clone(),
                        expected: len,
                        actual: items.len(),
                    });
                }
                for item in items {
                    self.encode_dims(member, item, rest)?;
                }
                Ok(())
            }
        }
    }

    fn encode_scalar(&mut self, member: &Member, value: &FieldValue) -> Result<(), EncodeError> {
        let mismatch = |expected: &str| EncodeError::TypeMismatch {
            field: member.name.clone(),
            expected: expected.to_string(),
        };

        match (&member.ty, value) {
            (FieldType::Struct(name), FieldValue::Struct(inner)) => {
                let def =
                    self.table.get(name).ok_or_else(|| EncodeError::UnknownType(name.clone()))?;
                self.encode_struct(def, inner)
            }
            (FieldType::Struct(name), _) => Err(mismatch(name)),
            (FieldType::Primitive(PrimitiveType::Boolean), FieldValue::Bool(b)) => {
                self.out.push(*b as u8);
                Ok(())
            }
            (FieldType::Primitive(PrimitiveType::String), FieldValue::Str(s)) => {
                self.out.extend_from_slice(&(s.len() as i32 + 1).to_be_bytes());
                self.out.extend_from_slice(s.as_bytes());
                self.out.push(0);
                Ok(())
            }
            (FieldType::Primitive(p @ (PrimitiveType::Float | PrimitiveType::Double)), v) => {
                let v = v.as_f64().ok_or_else(|| mismatch(p.name()))?;
                match p {
                    PrimitiveType::Float => self.out.extend_from_slice(&(v as f32).to_be_bytes()),
                    _ => self.out.extend_from_slice(&v.to_be_bytes()),
                }
                Ok(())
            }
            (FieldType::Primitive(p), FieldValue::Int(v)) if p.is_integer() => {
                let v = *v;
                match p {
                    PrimitiveType::Int8 => self.out.extend_from_slice(&(v as i8).to_be_bytes()),
                    PrimitiveType::Int16 => self.out.extend_from_slice(&(v as i16).to_be_bytes()),
                    PrimitiveType::Int32 => self.out.extend_from_slice(&(v as i32).to_be_bytes()),
                    PrimitiveType::Byte => self.out.push(v as u8),
                    _ => self.out.extend_from_slice(&v.to_be_bytes()),
                }
                Ok(())
            }
            (FieldType::Primitive(p), _) => Err(mismatch(p.name())),
        }
    }
}

/// Encode `msg` as the fully qualified type `full_name`, fingerprint first
pub fn encode(
    table: &TypeTable,
    full_name: &str,
    msg: &DecodedMessage,
) -> Result<Vec<u8>, EncodeError> {
    let def = table.get(full_name).ok_or_else(|| EncodeError::UnknownType(full_name.to_string()))?;
    let fingerprint =
        table.fingerprint(full_name).ok_or_else(|| EncodeError::UnknownType(full_name.to_string()))?;

    let mut encoder = Encoder {
        table,
        out: fingerprint.to_be_bytes().to_vec(),
    };
    encoder.encode_struct(def, msg)?;
    Ok(encoder.out)
}
