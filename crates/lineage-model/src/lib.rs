//! Workflow lineage graph model
//!
//! This crate defines the normalized graph that workflow exports are parsed
//! into, and the rows the lineage engine returns:
//!
//! - `rows`: one typed struct per Record Store table (mappings, instances,
//!   ports, edges, expressions, physical objects and their bindings)
//! - `ids`: the namespaced identifier scheme (`folder:mapping:instance:port`)
//! - `lineage`: lineage rows and target candidates returned to callers
//! - `overrides`: the optional embedded-query capability used by the parser
//!
//! All identifiers are plain strings so rows serialize to the same flat
//! JSON tables regardless of which component wrote them.

pub mod ids;
pub mod lineage;
pub mod overrides;
pub mod rows;

pub use ids::*;
pub use lineage::{LineageRow, Stage, TargetCandidate};
pub use overrides::{ColumnRef, ProjectedColumn, QueryOverride, QueryOverrideParser};
pub use rows::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Tables
// ============================================================================

/// The tables held by the Record Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Mappings,
    Instances,
    Ports,
    Edges,
    Expressions,
    PhysicalObjects,
    MapSources,
    MapTargets,
    InstancePhys,
    SqAssoc,
    Crosslinks,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Mappings,
        Table::Instances,
        Table::Ports,
        Table::Edges,
        Table::Expressions,
        Table::PhysicalObjects,
        Table::MapSources,
        Table::MapTargets,
        Table::InstancePhys,
        Table::SqAssoc,
        Table::Crosslinks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Mappings => "mappings",
            Table::Instances => "instances",
            Table::Ports => "ports",
            Table::Edges => "edges",
            Table::Expressions => "expressions",
            Table::PhysicalObjects => "physical_objects",
            Table::MapSources => "map_sources",
            Table::MapTargets => "map_targets",
            Table::InstancePhys => "instance_phys",
            Table::SqAssoc => "sq_assoc",
            Table::Crosslinks => "crosslinks",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown table: {0}")]
pub struct UnknownTable(pub String);

impl FromStr for Table {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTable(s.to_string()))
    }
}

/// A typed row that lives in exactly one table.
///
/// `KEY` lists the fields that identify a row for `upsert` /
/// `insert_if_missing`; field names match the serialized JSON keys.
pub trait TableRow: Serialize + serde::de::DeserializeOwned {
    const TABLE: Table;
    const KEY: &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_round_trip_through_from_str() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("nope".parse::<Table>().is_err());
    }

    #[test]
    fn table_serializes_as_its_file_name() {
        let json = serde_json::to_string(&Table::PhysicalObjects).unwrap();
        assert_eq!(json, "\"physical_objects\"");
    }
}
