//! Struct descriptors parsed from LCM type definitions

use std::collections::HashMap;
use std::fmt;

/// LCM primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Int8,
    Int16,
    Int32,
    Int64,
    Byte,
    Float,
    Double,
    Boolean,
    String,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int8_t" => Some(Self::Int8),
            "int16_t" => Some(Self::Int16),
            "int32_t" => Some(Self::Int32),
            "int64_t" => Some(Self::Int64),
            "byte" => Some(Self::Byte),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    /// Type name as written in `.lcm` files (and fed to the fingerprint hash)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::Int16 => "int16_t",
            Self::Int32 => "int32_t",
            Self::Int64 => "int64_t",
            Self::Byte => "byte",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Integer types may size variable-length arrays
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 | Self::Byte)
    }
}

/// Type of a struct member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// Fully qualified name of another struct
    Struct(String),
}

/// One array dimension of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    Const(usize),
    /// Sized by an earlier integer member of the same struct
    Var(String),
}

impl Dimension {
    /// Mode value used by the fingerprint hash
    pub fn mode(&self) -> u8 {
        match self {
            Dimension::Const(_) => 0,
            Dimension::Var(_) => 1,
        }
    }

    /// Size token exactly as written in the definition
    pub fn size_token(&self) -> String {
        match self {
            Dimension::Const(n) => n.to_string(),
            Dimension::Var(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: FieldType,
    pub dims: Vec<Dimension>,
}

/// `const` declarations carry no wire data; kept for display only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub ty: PrimitiveType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub package: Option<String>,
    pub name: String,
    pub members: Vec<Member>,
    pub constants: Vec<Constant>,
}

impl StructDef {
    pub fn full_name(&self) -> String {
        qualify(self.package.as_deref(), &self.name)
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Qualify a type name with a package, unless it already carries one
pub fn qualify(package: Option<&str>, name: &str) -> String {
    match package {
        Some(package) if !name.contains('.') && !package.is_empty() => {
            format!("{package}.{name}")
        }
        _ => name.to_string(),
    }
}

/// Name without its package prefix
pub fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

/// All known structs keyed by fully qualified name, with their fingerprints
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    structs: HashMap<String, StructDef>,
    fingerprints: HashMap<String, u64>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, full_name: &str) -> Option<&StructDef> {
        self.structs.get(full_name)
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.structs.contains_key(full_name)
    }

    pub fn fingerprint(&self, full_name: &str) -> Option<u64> {
        self.fingerprints.get(full_name).copied()
    }

    pub(crate) fn insert(&mut self, def: StructDef) {
        self.structs.insert(def.full_name(), def);
    }

    pub(crate) fn remove(&mut self, full_name: &str) {
        self.structs.remove(full_name);
        self.fingerprints.remove(full_name);
    }

    pub(crate) fn set_fingerprint(&mut self, full_name: &str, fingerprint: u64) {
        self.fingerprints.insert(full_name.to_string(), fingerprint);
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{}", p.name()),
            FieldType::Struct(name) => write!(f, "{name}"),
        }
    }
}
