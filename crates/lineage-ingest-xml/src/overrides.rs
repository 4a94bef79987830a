//! Embedded SQL overrides on source qualifiers and lookups.
//!
//! The raw text is always kept as an expression on a pseudo-port. When an
//! override parser is configured and understands the text, each referenced
//! table becomes a pseudo-Source instance `<INSTANCE>.<ALIAS>` bound to its
//! physical object, with edges from its columns into the qualifier's ports.

use crate::builder::BuildContext;
use crate::decl::TransformDecl;
use crate::graph::GraphFragment;
use lineage_model::*;
use std::collections::{BTreeMap, BTreeSet};

/// Pseudo-port carrying a source qualifier's raw SQL override.
const SQL_OVERRIDE_PORT: &str = "__sql_override__";

pub fn apply_override(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    inst_id: &str,
    instance_name: &str,
    tx: &TransformDecl,
    attr_name: &str,
    sql: &str,
) {
    let sql = sql.trim();
    // SQ override text gets its own pseudo-port so `__assoc_source__` holds
    // only associated source names.
    let (kind, note_port) = if tx.is_source_qualifier() {
        (ExprKind::AssocSource, SQL_OVERRIDE_PORT)
    } else {
        (ExprKind::Lookup, "__lookup__")
    };
    let note = frag.add_port(inst_id, note_port, "", Direction::Output);
    frag.add_expression(&note, kind, sql, Some(attr_name));

    let Some(parser) = ctx.overrides else {
        frag.stats.unparsed_overrides += 1;
        tracing::debug!(
            event = "override_parse_unavailable",
            instance = %inst_id,
            "no override parser configured; raw text kept"
        );
        return;
    };
    let Some(query) = parser.try_parse(sql) else {
        frag.stats.unparsed_overrides += 1;
        tracing::warn!(
            event = "override_parse_unavailable",
            instance = %inst_id,
            attribute = %attr_name,
            "SQL override not understood; raw text kept"
        );
        return;
    };
    frag.stats.parsed_overrides += 1;

    let mut pseudo: BTreeMap<&str, String> = BTreeMap::new();
    for (alias, table) in &query.tables {
        let name = format!("{instance_name}.{alias}");
        let id = frag.add_instance(ctx.mapping_id, &name, InstanceType::Source);
        let (db, schema, object) = split_table_name(table);
        let full = full_name(db, schema, object);
        frag.bind_physical(ctx.mapping_id, &id, PhysKind::Source, db, schema, object, &full);
        pseudo.insert(alias.as_str(), id);
    }

    let outputs: Vec<&str> = tx
        .fields
        .iter()
        .filter(|f| Direction::classify(&f.port_type) != Direction::Input)
        .map(|f| f.name.as_str())
        .collect();
    let targets = assign_outputs(&query.projection, &outputs);
    for (column, target) in query.projection.iter().zip(targets) {
        let Some(target) = target else {
            continue;
        };
        let to = port_id(inst_id, target);
        for r in &column.sources {
            let Some(src_inst) = pseudo.get(r.alias.as_str()) else {
                continue;
            };
            let from = frag.add_port(src_inst, &r.column, "", Direction::Output);
            frag.add_edge(&from, &to);
        }
    }

    if !query.join_predicates.is_empty() {
        let pid = frag.add_port(inst_id, "__join__", "", Direction::Output);
        frag.add_expression(
            &pid,
            ExprKind::Join,
            &query.join_predicates.join(" AND "),
            Some("sql_override"),
        );
    }
    if let Some(filter) = &query.filter {
        let pid = frag.add_port(inst_id, "__filter__", "", Direction::Output);
        frag.add_expression(&pid, ExprKind::Filter, filter, Some("sql_override"));
    }
}

/// Output port for each select-list column. Name matches are claimed first;
/// the remaining columns take the unclaimed outputs in select-list order.
fn assign_outputs<'a>(projection: &[ProjectedColumn], outputs: &[&'a str]) -> Vec<Option<&'a str>> {
    let mut claimed: BTreeSet<usize> = BTreeSet::new();
    let mut assigned: Vec<Option<&'a str>> = projection
        .iter()
        .map(|column| {
            let (idx, name) = outputs
                .iter()
                .enumerate()
                .find(|(i, o)| !claimed.contains(i) && o.eq_ignore_ascii_case(&column.name))?;
            claimed.insert(idx);
            Some(*name)
        })
        .collect();

    let mut free = (0..outputs.len()).filter(|i| !claimed.contains(i));
    for slot in assigned.iter_mut().filter(|s| s.is_none()) {
        *slot = free.next().map(|i| outputs[i]);
    }
    assigned
}

/// `DB.SCHEMA.NAME`, `SCHEMA.NAME` or `NAME`; extra leading parts fold into
/// the database.
fn split_table_name(table: &str) -> (&str, &str, &str) {
    let mut parts = table.rsplitn(3, '.');
    let name = parts.next().unwrap_or(table);
    let schema = parts.next().unwrap_or("");
    let db = parts.next().unwrap_or("");
    (db, schema, name)
}
