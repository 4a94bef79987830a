//! Namespaced identifiers.
//!
//! Every id is built by joining its parent id and a local name with `:`, so
//! ids from independently parsed workflows never collide:
//!
//! ```text
//! mapping_id  = FOLDER:MAPPING
//! instance_id = FOLDER:MAPPING:INSTANCE      (mapplet members: OUTER.INNER)
//! port_id     = FOLDER:MAPPING:INSTANCE:PORT
//! object_id   = SRC:DB.SCHEMA.NAME | TGT:DB.SCHEMA.NAME
//! ```

use crate::PhysKind;

pub const ID_SEP: char = ':';

pub fn join_id(parent: &str, name: &str) -> String {
    format!("{parent}{ID_SEP}{name}")
}

pub fn mapping_id(folder: &str, mapping: &str) -> String {
    join_id(folder, mapping)
}

pub fn instance_id(mapping_id: &str, instance: &str) -> String {
    join_id(mapping_id, instance)
}

pub fn port_id(instance_id: &str, port: &str) -> String {
    join_id(instance_id, port)
}

pub fn object_id(kind: PhysKind, full_name: &str) -> String {
    join_id(kind.tag(), full_name)
}

/// `DB.SCHEMA.NAME` when both qualifiers are known, otherwise the bare name.
///
/// Qualifiers are upper-cased; the object name keeps the spelling of the
/// declaration.
pub fn full_name(db: &str, schema: &str, name: &str) -> String {
    let db = db.trim().to_uppercase();
    let schema = schema.trim().to_uppercase();
    if !db.is_empty() && !schema.is_empty() {
        format!("{db}.{schema}.{name}")
    } else {
        name.to_string()
    }
}

/// Split a port id into `(instance_id, port_name)`.
///
/// Port names never contain `:`, so the split is on the last separator.
pub fn split_port_id(port_id: &str) -> Option<(&str, &str)> {
    let (inst, port) = port_id.rsplit_once(ID_SEP)?;
    if inst.is_empty() || port.is_empty() {
        return None;
    }
    Some((inst, port))
}

/// Split an instance id into `(mapping_id, instance_name)`.
pub fn split_instance_id(instance_id: &str) -> Option<(&str, &str)> {
    let (mapping, inst) = instance_id.rsplit_once(ID_SEP)?;
    if !mapping.contains(ID_SEP) || inst.is_empty() {
        return None;
    }
    Some((mapping, inst))
}

/// Strip any qualifier prefix (text up to the last `:` or `.`) from a field.
pub fn strip_qualifier(field: &str) -> &str {
    match field.rfind([':', '.']) {
        Some(idx) => &field[idx + 1..],
        None => field,
    }
}
