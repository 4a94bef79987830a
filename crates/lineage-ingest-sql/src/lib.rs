//! SQL override parsing for lineage
//!
//! Extracts the lineage-relevant structure from a source qualifier (or
//! lookup) SQL override:
//! - FROM / JOIN tables -> `{alias -> full table name}`
//! - Select list -> `{output column -> [(alias, source column)]}`
//! - ON clauses -> join predicate text
//! - WHERE clause -> filter text
//!
//! Only SELECT queries (including set operations) are understood; anything
//! else yields `None` from `try_parse` and the caller keeps the raw text.

use anyhow::{anyhow, Result};
use lineage_model::{ColumnRef, ProjectedColumn, QueryOverride, QueryOverrideParser};
use regex::Regex;
use sqlparser::ast::*;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// `QueryOverrideParser` backed by `sqlparser`'s generic dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlOverrideParser;

impl SqlOverrideParser {
    pub fn new() -> Self {
        Self
    }
}

impl QueryOverrideParser for SqlOverrideParser {
    fn try_parse(&self, sql: &str) -> Option<QueryOverride> {
        match parse_sql_override(sql) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::debug!(error = %err, "sql override not parsed");
                None
            }
        }
    }
}

/// Parse a single SELECT statement into a `QueryOverride`.
pub fn parse_sql_override(sql: &str) -> Result<QueryOverride> {
    let sql = sql.trim().trim_end_matches(';').trim();
    if sql.is_empty() {
        return Err(anyhow!("empty SQL override"));
    }

    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql)?;
    let [Statement::Query(query)] = statements.as_slice() else {
        return Err(anyhow!(
            "expected a single SELECT statement, found {} statement(s)",
            statements.len()
        ));
    };

    let mut out = QueryOverride::default();
    let projection = walk_set_expr(query.body.as_ref(), &mut out);
    if projection.is_empty() {
        return Err(anyhow!("query has no select list"));
    }
    out.projection = projection;
    Ok(out)
}

// ============================================================================
// Query walking
// ============================================================================

fn walk_set_expr(body: &SetExpr, out: &mut QueryOverride) -> Vec<ProjectedColumn> {
    match body {
        SetExpr::Select(select) => walk_select(select, out),
        SetExpr::Query(inner) => walk_set_expr(inner.body.as_ref(), out),
        SetExpr::SetOperation { left, right, .. } => {
            // Output names come from the left branch; the right branch adds
            // sources to the same positions.
            let mut cols = walk_set_expr(left, out);
            let right_cols = walk_set_expr(right, out);
            for (col, extra) in cols.iter_mut().zip(right_cols) {
                for src in extra.sources {
                    if !col.sources.contains(&src) {
                        col.sources.push(src);
                    }
                }
            }
            cols
        }
        _ => Vec::new(),
    }
}

fn walk_select(select: &Select, out: &mut QueryOverride) -> Vec<ProjectedColumn> {
    let mut scope: Vec<String> = Vec::new();
    for twj in &select.from {
        add_table_factor(&twj.relation, out, &mut scope);
        for join in &twj.joins {
            add_table_factor(&join.relation, out, &mut scope);
            if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
                out.join_predicates.push(expr.to_string());
            }
        }
    }

    if let Some(selection) = &select.selection {
        let text = selection.to_string();
        out.filter = Some(match out.filter.take() {
            Some(prev) => format!("{prev} AND {text}"),
            None => text,
        });
    }

    let mut cols = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                cols.push(projected(output_name(expr), expr, &scope));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                cols.push(projected(alias.value.clone(), expr, &scope));
            }
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                tracing::debug!("wildcard in sql override select list; columns not expanded");
            }
        }
    }
    cols
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c) => Some(c),
        _ => None,
    }
}

fn add_table_factor(factor: &TableFactor, out: &mut QueryOverride, scope: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let full = object_name(name);
            let alias = alias
                .as_ref()
                .map(|a| a.name.value.to_uppercase())
                .unwrap_or_else(|| {
                    name.0
                        .last()
                        .map(|i| i.value.to_uppercase())
                        .unwrap_or_else(|| full.clone())
                });
            out.tables.insert(alias.clone(), full);
            scope.push(alias);
        }
        TableFactor::Derived { subquery, .. } => {
            // Base tables of an inline view are still read by the override.
            walk_set_expr(subquery.body.as_ref(), out);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            add_table_factor(&table_with_joins.relation, out, scope);
            for join in &table_with_joins.joins {
                add_table_factor(&join.relation, out, scope);
                if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
                    out.join_predicates.push(expr.to_string());
                }
            }
        }
        _ => {}
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|i| i.value.to_uppercase())
        .collect::<Vec<_>>()
        .join(".")
}

fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        _ => expr.to_string(),
    }
}

fn projected(name: String, expr: &Expr, scope: &[String]) -> ProjectedColumn {
    let mut refs = BTreeSet::new();
    collect_refs(expr, scope, &mut refs);
    ProjectedColumn {
        name,
        sources: refs.into_iter().collect(),
        expression: expr.to_string(),
    }
}

// ============================================================================
// Column references
// ============================================================================

fn collect_refs(expr: &Expr, scope: &[String], refs: &mut BTreeSet<ColumnRef>) {
    match expr {
        Expr::Identifier(ident) => {
            // Unqualified columns resolve only when a single table is in scope.
            if let [only] = scope {
                refs.insert(ColumnRef {
                    alias: only.clone(),
                    column: ident.value.to_uppercase(),
                });
            }
        }
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let alias = parts[parts.len() - 2].value.to_uppercase();
            let column = parts[parts.len() - 1].value.to_uppercase();
            refs.insert(ColumnRef { alias, column });
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, scope, refs);
            collect_refs(right, scope, refs);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => collect_refs(expr, scope, refs),
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(op) = operand {
                collect_refs(op, scope, refs);
            }
            for e in conditions.iter().chain(results.iter()) {
                collect_refs(e, scope, refs);
            }
            if let Some(e) = else_result {
                collect_refs(e, scope, refs);
            }
        }
        Expr::Function(func) => {
            for arg in &func.args {
                let arg_expr = match arg {
                    FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg) => arg,
                };
                if let FunctionArgExpr::Expr(e) = arg_expr {
                    collect_refs(e, scope, refs);
                }
            }
        }
        other => collect_refs_from_text(&other.to_string(), scope, refs),
    }
}

fn qualified_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_][A-Za-z0-9_$#]*)\.([A-Za-z_][A-Za-z0-9_$#]*)")
            .expect("static regex")
    })
}

/// Fallback for expression shapes not walked structurally: pick up
/// `alias.column` pairs whose alias is in scope.
fn collect_refs_from_text(text: &str, scope: &[String], refs: &mut BTreeSet<ColumnRef>) {
    for caps in qualified_ref_re().captures_iter(text) {
        let alias = caps[1].to_uppercase();
        if scope.contains(&alias) {
            refs.insert(ColumnRef {
                alias,
                column: caps[2].to_uppercase(),
            });
        }
    }
}
