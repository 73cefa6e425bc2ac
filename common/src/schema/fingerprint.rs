//! LCM type fingerprints
//!
//! Every encoded LCM message starts with a 64-bit fingerprint derived from the
//! member names, primitive type names and array dimensions of its type. Struct
//! members contribute their own fingerprint recursively, so a change in a
//! nested type changes the fingerprint of every type that embeds it.

use super::types::{FieldType, StructDef, TypeTable};

const HASH_SEED: i64 = 0x12345678;

fn hash_update(v: i64, c: i8) -> i64 {
    (v.wrapping_shl(8) ^ (v >> 55)).wrapping_add(c as i64)
}

fn hash_string_update(mut v: i64, s: &str) -> i64 {
    v = hash_update(v, s.len() as i8);
    for b in s.bytes() {
        v = hash_update(v, b as i8);
    }
    v
}

/// Non-recursive hash of a struct's own layout
pub fn base_hash(def: &StructDef) -> u64 {
    let mut v = HASH_SEED;
    for member in &def.members {
        v = hash_string_update(v, &member.name);
        if let FieldType::Primitive(primitive) = member.ty {
            v = hash_string_update(v, primitive.name());
        }
        v = hash_update(v, member.dims.len() as i8);
        for dim in &member.dims {
            v = hash_update(v, dim.mode() as i8);
            v = hash_string_update(v, &dim.size_token());
        }
    }
    v as u64
}

/// Full fingerprint, folding in every nested struct member.
///
/// Returns `None` if a referenced struct is missing from the table.
pub fn fingerprint(table: &TypeTable, full_name: &str) -> Option<u64> {
    recursive_hash(table, full_name, &mut Vec::new())
}

fn recursive_hash(table: &TypeTable, full_name: &str, parents: &mut Vec<String>) -> Option<u64> {
    if parents.iter().any(|p| p == full_name) {
        return Some(0);
    }
    let def = table.get(full_name)?;

    parents.push(full_name.to_string());
    let mut hash = base_hash(def);
    for member in &def.members {
        if let FieldType::Struct(child) = &member.ty {
            hash = hash.wrapping_add(recursive_hash(table, child, parents)?);
        }
    }
    parents.pop();

    Some(hash.rotate_left(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::parse_lcm;

    fn table_from(source: &str) -> TypeTable {
        let mut table = TypeTable::new();
        for def in parse_lcm(source).unwrap() {
            table.insert(def);
        }
        table
    }

    #[test]
    fn test_fingerprint_ignores_struct_name() {
        let table = table_from("struct a_t { int64_t utime; } struct b_t { int64_t utime; }");
        assert_eq!(fingerprint(&table, "a_t"), fingerprint(&table, "b_t"));
    }

    #[test]
    fn test_fingerprint_depends_on_member_names_and_types() {
        let table = table_from(
            "struct a_t { float x; } struct b_t { float y; } struct c_t { double x; }",
        );
        let a = fingerprint(&table, "a_t").unwrap();
        assert_ne!(a, fingerprint(&table, "b_t").unwrap());
        assert_ne!(a, fingerprint(&table, "c_t").unwrap());
    }

    #[test]
    fn test_fingerprint_depends_on_dimensions() {
        let table = table_from(
            "struct a_t { int32_t n; float v[3]; } struct b_t { int32_t n; float v[n]; }",
        );
        assert_ne!(fingerprint(&table, "a_t"), fingerprint(&table, "b_t"));
    }

    #[test]
    fn test_nested_change_propagates() {
        let one = table_from("struct inner_t { float x; } struct outer_t { inner_t i; }");
        let two = table_from("struct inner_t { float z; } struct outer_t { inner_t i; }");
        assert_ne!(fingerprint(&one, "outer_t"), fingerprint(&two, "outer_t"));
    }

    #[test]
    fn test_missing_nested_type() {
        let table = table_from("struct outer_t { inner_t i; }");
        assert_eq!(fingerprint(&table, "outer_t"), None);
    }

    #[test]
    fn test_self_reference_terminates() {
        let table = table_from("struct node_t { int32_t n; node_t children[n]; }");
        assert!(fingerprint(&table, "node_t").is_some());
    }
}
