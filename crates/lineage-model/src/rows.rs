//! One struct per Record Store table.

use crate::{Table, TableRow};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstanceType {
    Source,
    Target,
    Transformation,
}

impl InstanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceType::Source => "Source",
            InstanceType::Target => "Target",
            InstanceType::Transformation => "Transformation",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Input,
    Output,
    Variable,
}

impl Direction {
    /// Classify an export `PORTTYPE`; anything unrecognized is a variable.
    ///
    /// Combined `INPUT/OUTPUT` ports are treated as variables: they both
    /// receive a connector and are referenced by sibling expressions.
    pub fn classify(port_type: &str) -> Direction {
        match port_type.trim().to_uppercase().as_str() {
            "INPUT" => Direction::Input,
            "OUTPUT" => Direction::Output,
            _ => Direction::Variable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Expr,
    Join,
    Filter,
    Groupby,
    Lookup,
    AssocSource,
}

impl ExprKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExprKind::Expr => "expr",
            ExprKind::Join => "join",
            ExprKind::Filter => "filter",
            ExprKind::Groupby => "groupby",
            ExprKind::Lookup => "lookup",
            ExprKind::AssocSource => "assoc_source",
        }
    }

    /// Condition kind named by a free-form attribute, e.g. `Join Condition`.
    pub fn from_attribute_name(name: &str) -> Option<ExprKind> {
        let name = name.to_lowercase();
        if name.contains("join") {
            Some(ExprKind::Join)
        } else if name.contains("filter") {
            Some(ExprKind::Filter)
        } else if name.contains("group") {
            Some(ExprKind::Groupby)
        } else if name.contains("lookup") {
            Some(ExprKind::Lookup)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhysKind {
    Source,
    Target,
}

impl PhysKind {
    pub fn tag(self) -> &'static str {
        match self {
            PhysKind::Source => "SRC",
            PhysKind::Target => "TGT",
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub mapping_id: String,
    pub name: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub mapping_id: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub port_id: String,
    pub instance_id: String,
    pub name: String,
    pub dtype: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from_port_id: String,
    pub to_port_id: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_port_id: from.into(),
            to_port_id: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub port_id: String,
    pub kind: ExprKind,
    pub raw: String,
    pub meta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalObject {
    pub object_id: String,
    pub kind: PhysKind,
    pub db: String,
    pub schema: String,
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSource {
    pub mapping_id: String,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTarget {
    pub mapping_id: String,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePhys {
    pub instance_id: String,
    pub object_id: String,
    pub role: PhysKind,
}

/// A source qualifier reading from an associated Source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqAssoc {
    pub mapping_id: String,
    pub sq_instance_id: String,
    pub source_instance_id: String,
}

/// A Source in one workflow and a Target in another bound to the same
/// physical full name. Catalog of possible handoffs, written after a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLink {
    pub full_name: String,
    pub source_mapping_id: String,
    pub source_instance_id: String,
    pub target_mapping_id: String,
    pub target_instance_id: String,
}

macro_rules! table_row {
    ($ty:ty, $table:expr, [$($key:literal),+ $(,)?]) => {
        impl TableRow for $ty {
            const TABLE: Table = $table;
            const KEY: &'static [&'static str] = &[$($key),+];
        }
    };
}

table_row!(Mapping, Table::Mappings, ["mapping_id"]);
table_row!(Instance, Table::Instances, ["instance_id"]);
table_row!(Port, Table::Ports, ["port_id"]);
table_row!(Edge, Table::Edges, ["from_port_id", "to_port_id"]);
table_row!(Expression, Table::Expressions, ["port_id", "kind", "raw"]);
table_row!(PhysicalObject, Table::PhysicalObjects, ["object_id"]);
table_row!(MapSource, Table::MapSources, ["mapping_id", "object_id"]);
table_row!(MapTarget, Table::MapTargets, ["mapping_id", "object_id"]);
table_row!(InstancePhys, Table::InstancePhys, ["instance_id", "object_id", "role"]);
table_row!(SqAssoc, Table::SqAssoc, ["sq_instance_id", "source_instance_id"]);
table_row!(
    CrossLink,
    Table::Crosslinks,
    ["full_name", "source_instance_id", "target_instance_id"]
);
