//! Message schema registry
//!
//! Holds an ordered set of LCM message types. Each type can trial-decode a raw
//! payload; the registry tries them in registration order and the first one
//! that decodes cleanly names the payload's type. Built-in MBot types are
//! embedded in the binary, further types can be loaded from `.lcm` files at
//! runtime.

pub mod codec;
pub mod fingerprint;
pub mod parser;
pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

pub use codec::{DecodeError, DecodedMessage, EncodeError, FieldValue};
pub use parser::SchemaParseError;
pub use types::{StructDef, TypeTable};

/// Package of the built-in message set
pub const BUILTIN_PACKAGE: &str = "mbot_lcm_msgs";

const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("lidar_t.lcm", include_str!("lcmtypes/lidar_t.lcm")),
    ("mbot_analog_t.lcm", include_str!("lcmtypes/mbot_analog_t.lcm")),
    ("mbot_apriltag_array_t.lcm", include_str!("lcmtypes/mbot_apriltag_array_t.lcm")),
    ("mbot_apriltag_t.lcm", include_str!("lcmtypes/mbot_apriltag_t.lcm")),
    ("mbot_encoders_t.lcm", include_str!("lcmtypes/mbot_encoders_t.lcm")),
    ("mbot_imu_t.lcm", include_str!("lcmtypes/mbot_imu_t.lcm")),
    ("mbot_motor_pwm_t.lcm", include_str!("lcmtypes/mbot_motor_pwm_t.lcm")),
    ("mbot_motor_vel_t.lcm", include_str!("lcmtypes/mbot_motor_vel_t.lcm")),
    ("occupancy_grid_t.lcm", include_str!("lcmtypes/occupancy_grid_t.lcm")),
    ("path2D_t.lcm", include_str!("lcmtypes/path2D_t.lcm")),
    ("pose2D_t.lcm", include_str!("lcmtypes/pose2D_t.lcm")),
    ("pose3D_t.lcm", include_str!("lcmtypes/pose3D_t.lcm")),
    ("timestamp_t.lcm", include_str!("lcmtypes/timestamp_t.lcm")),
    ("twist2D_t.lcm", include_str!("lcmtypes/twist2D_t.lcm")),
];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {0}: {1}")]
    ReadFile(PathBuf, std::io::Error),

    #[error("failed to parse {origin}: {error}")]
    Parse {
        origin: String,
        error: SchemaParseError,
    },

    #[error("no .lcm type definitions found in {0}")]
    Empty(PathBuf),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One registered message type
#[derive(Debug, Clone, Copy)]
pub struct MessageSchema<'r> {
    table: &'r TypeTable,
    full_name: &'r str,
}

impl<'r> MessageSchema<'r> {
    /// Short type name, e.g. `mbot_imu_t`
    pub fn type_name(&self) -> &'r str {
        types::short_name(self.full_name)
    }

    pub fn full_name(&self) -> &'r str {
        self.full_name
    }

    pub fn fingerprint(&self) -> u64 {
        self.table.fingerprint(self.full_name).unwrap_or_default()
    }

    /// Decode `bytes` as this type. Never has side effects.
    pub fn try_decode(&self, bytes: &[u8]) -> Result<DecodedMessage, DecodeError> {
        codec::decode(self.table, self.full_name, bytes)
    }

    pub fn field_names(&self, msg: &'r DecodedMessage) -> Vec<&'r str> {
        msg.field_names()
    }
}

/// Ordered set of known message types
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    table: TypeTable,
    order: Vec<String>,
}

impl SchemaRegistry {
    /// An empty registry: every payload decodes as unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in MBot message types
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        let mut defs = Vec::new();
        for (origin, source) in BUILTIN_TYPES {
            defs.extend(parse_source(origin, source)?);
        }
        registry.add_definitions(defs);
        Ok(registry)
    }

    /// Parse a `.lcm` source and register its types. Returns how many were added.
    pub fn add_source(&mut self, origin: &str, source: &str) -> Result<usize, SchemaError> {
        let defs = parse_source(origin, source)?;
        Ok(self.add_definitions(defs))
    }

    /// Load an external schema module: a single `.lcm` file or a directory of them.
    ///
    /// Types from the module are registered after those already present.
    pub fn load_module(&mut self, path: &Path) -> Result<usize, SchemaError> {
        let files = if path.is_dir() {
            let entries =
                fs::read_dir(path).map_err(|e| SchemaError::ReadFile(path.to_path_buf(), e))?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "lcm"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut defs = Vec::new();
        for file in &files {
            let source =
                fs::read_to_string(file).map_err(|e| SchemaError::ReadFile(file.clone(), e))?;
            defs.extend(parse_source(&file.display().to_string(), &source)?);
        }
        if defs.is_empty() {
            return Err(SchemaError::Empty(path.to_path_buf()));
        }
        Ok(self.add_definitions(defs))
    }

    /// Insert parsed definitions, then fingerprint them. Types whose nested
    /// members cannot be resolved are dropped with a warning.
    fn add_definitions(&mut self, mut defs: Vec<StructDef>) -> usize {
        defs.sort_by_key(|d| d.full_name());

        let mut pending = Vec::new();
        for def in defs {
            let full_name = def.full_name();
            if self.table.contains(&full_name) {
                warn!("Ignoring duplicate definition of {full_name}");
                continue;
            }
            self.table.insert(def);
            pending.push(full_name);
        }

        let mut added = 0;
        let mut unresolved = Vec::new();
        for full_name in pending {
            match fingerprint::fingerprint(&self.table, &full_name) {
                Some(fp) => {
                    debug!("Registered {full_name} ({fp:#018x})");
                    self.table.set_fingerprint(&full_name, fp);
                    self.order.push(full_name);
                    added += 1;
                }
                None => unresolved.push(full_name),
            }
        }
        for full_name in unresolved {
            warn!("Dropping {full_name}: it refers to an unknown type");
            self.table.remove(&full_name);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered types in trial order
    pub fn schemas(&self) -> impl Iterator<Item = MessageSchema<'_>> + '_ {
        self.order.iter().map(|full_name| MessageSchema {
            table: &self.table,
            full_name,
        })
    }

    /// Look up a type by short or fully qualified name
    pub fn get(&self, name: &str) -> Option<MessageSchema<'_>> {
        self.schemas().find(|s| s.full_name() == name || s.type_name() == name)
    }

    /// Trial-decode against every type in order; the first clean decode wins
    pub fn infer(&self, bytes: &[u8]) -> Option<DecodedMessage> {
        self.schemas().find_map(|schema| schema.try_decode(bytes).ok())
    }

    /// Encode a message of the named type, fingerprint included
    pub fn encode(&self, name: &str, msg: &DecodedMessage) -> Result<Vec<u8>, SchemaError> {
        let schema = self.get(name).ok_or_else(|| SchemaError::UnknownType(name.to_string()))?;
        Ok(codec::encode(&self.table, schema.full_name(), msg)?)
    }
}

fn parse_source(origin: &str, source: &str) -> Result<Vec<StructDef>, SchemaError> {
    parser::parse_lcm(source).map_err(|error| SchemaError::Parse {
        origin: origin.to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(utime: i64) -> DecodedMessage {
        DecodedMessage {
            type_name: "timestamp_t".to_string(),
            fields: vec![("utime".to_string(), FieldValue::Int(utime))],
        }
    }

    #[test]
    fn test_builtin_types_all_resolve() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(registry.len(), BUILTIN_TYPES.len());

        let names: Vec<_> = registry.schemas().map(|s| s.type_name()).collect();
        let mut sorted = names.clone();
        sorted.sort_by_key(|n| format!("{BUILTIN_PACKAGE}.{n}"));
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_builtin_fingerprints_are_distinct() {
        let registry = SchemaRegistry::builtin().unwrap();
        let mut fingerprints: Vec<u64> = registry.schemas().map(|s| s.fingerprint()).collect();
        fingerprints.sort();
        fingerprints.dedup();
        assert_eq!(fingerprints.len(), registry.len());
    }

    #[test]
    fn test_infer_is_deterministic() {
        let registry = SchemaRegistry::builtin().unwrap();
        let bytes = registry.encode("timestamp_t", &stamp(42)).unwrap();
        for _ in 0..10 {
            let decoded = registry.infer(&bytes).unwrap();
            assert_eq!(decoded.type_name, "timestamp_t");
            assert_eq!(decoded.get("utime"), Some(&FieldValue::Int(42)));
        }
    }

    #[test]
    fn test_infer_unknown_payload() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert!(registry.infer(b"not an lcm message").is_none());
        assert!(registry.infer(&[]).is_none());
    }

    #[test]
    fn test_first_matching_schema_wins() {
        // Identical layouts share a fingerprint; registration order decides
        let mut registry = SchemaRegistry::new();
        registry
            .add_source("test", "struct b_t { int64_t utime; } struct a_t { int64_t utime; }")
            .unwrap();
        let bytes = registry.encode("b_t", &stamp(1)).unwrap();
        assert_eq!(registry.infer(&bytes).unwrap().type_name, "a_t");
    }

    #[test]
    fn test_unresolved_types_are_dropped() {
        let mut registry = SchemaRegistry::new();
        let added = registry
            .add_source(
                "test",
                "struct ok_t { int8_t v; } struct bad_t { missing_t m; } struct worse_t { bad_t b; }",
            )
            .unwrap();
        assert_eq!(added, 1);
        assert!(registry.get("ok_t").is_some());
        assert!(registry.get("bad_t").is_none());
        assert!(registry.get("worse_t").is_none());
    }

    #[test]
    fn test_load_module_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("battery_t.lcm"),
            "package extra; struct battery_t { int64_t utime; float cells[4]; }",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a type").unwrap();

        let mut registry = SchemaRegistry::builtin().unwrap();
        let builtin_count = registry.len();
        assert_eq!(registry.load_module(dir.path()).unwrap(), 1);
        assert_eq!(registry.len(), builtin_count + 1);
        assert_eq!(registry.schemas().last().unwrap().full_name(), "extra.battery_t");
    }

    #[test]
    fn test_load_module_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SchemaRegistry::new();
        assert!(matches!(registry.load_module(dir.path()), Err(SchemaError::Empty(_))));
        assert!(matches!(
            registry.load_module(&dir.path().join("missing.lcm")),
            Err(SchemaError::ReadFile(..))
        ));

        fs::write(dir.path().join("broken.lcm"), "struct broken_t {").unwrap();
        assert!(matches!(registry.load_module(dir.path()), Err(SchemaError::Parse { .. })));
    }
}
