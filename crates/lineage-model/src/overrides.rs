//! Embedded-query override capability.
//!
//! Source qualifiers and lookups may carry a SQL override in place of the
//! default generated query. Parsing it is optional: the graph builder takes
//! a `QueryOverrideParser` and, when none is supplied (or it returns `None`),
//! records the raw text only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `alias.column` as referenced in a projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    /// Output name: the explicit alias, or the bare column name.
    pub name: String,
    pub sources: Vec<ColumnRef>,
    pub expression: String,
}

/// Structured view of a parsed override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOverride {
    /// Upper-cased alias (or table name when unaliased) to upper-cased
    /// fully-qualified table name.
    pub tables: BTreeMap<String, String>,
    /// Select-list items in declaration order.
    pub projection: Vec<ProjectedColumn>,
    pub join_predicates: Vec<String>,
    pub filter: Option<String>,
}

impl QueryOverride {
    /// `{output_column -> [(alias, source_column)]}` keyed by upper-cased name.
    pub fn column_sources(&self) -> BTreeMap<String, Vec<ColumnRef>> {
        let mut out: BTreeMap<String, Vec<ColumnRef>> = BTreeMap::new();
        for col in &self.projection {
            out.entry(col.name.to_uppercase())
                .or_default()
                .extend(col.sources.iter().cloned());
        }
        out
    }
}

pub trait QueryOverrideParser: Send + Sync {
    /// Parse `sql`, or `None` when the text is not a supported query.
    fn try_parse(&self, sql: &str) -> Option<QueryOverride>;
}
