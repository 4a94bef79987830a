//! Graph construction for one MAPPING.
//!
//! Mappings and mapplets share a body layout (transformations, instances,
//! connectors), so both go through [`build_body`]; mapplet bodies are built
//! under a name prefix and merged back by `mapplet::inline_mapplet`.

use crate::decl::{ConnectorDecl, ContainerDecl, FolderCatalog, InstanceDecl, TableDecl, TransformDecl};
use crate::expr::identifier_tokens;
use crate::graph::{GraphFragment, MappingGraph};
use crate::mapplet::inline_mapplet;
use crate::overrides::apply_override;
use crate::ParseOptions;
use lineage_model::*;
use std::collections::HashSet;

/// Read-only inputs shared by every body built for one mapping.
pub struct BuildContext<'a> {
    pub mapping_id: &'a str,
    pub folder: &'a FolderCatalog,
    pub options: &'a ParseOptions,
    pub overrides: Option<&'a dyn QueryOverrideParser>,
}

pub fn build_mapping(
    folder: &FolderCatalog,
    mapping: &ContainerDecl,
    options: &ParseOptions,
    overrides: Option<&dyn QueryOverrideParser>,
) -> MappingGraph {
    let mid = mapping_id(&folder.name, &mapping.name);
    let ctx = BuildContext {
        mapping_id: &mid,
        folder,
        options,
        overrides,
    };
    let graph = build_body(&ctx, mapping, "", &[]);
    MappingGraph {
        mapping: Mapping {
            mapping_id: mid.clone(),
            name: mapping.name.clone(),
            folder: folder.name.clone(),
        },
        graph,
    }
}

/// Instance name of `local` inside a body built under `prefix`.
pub fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}.{local}")
    }
}

/// Build the instances, ports and edges of one container body.
///
/// `ancestors` holds the upper-cased names of the mapplets currently being
/// inlined around this body.
pub fn build_body(
    ctx: &BuildContext<'_>,
    body: &ContainerDecl,
    prefix: &str,
    ancestors: &[String],
) -> GraphFragment {
    let mut frag = GraphFragment::default();

    let mut local_transforms = HashSet::new();
    for tx in &body.transformations {
        materialize_transform(ctx, &mut frag, &qualify(prefix, &tx.name), tx);
        local_transforms.insert(tx.name.to_uppercase());
    }

    for inst in &body.instances {
        let name = qualify(prefix, &inst.name);
        if !local_transforms.contains(&inst.name.to_uppercase()) {
            bind_instance(ctx, &mut frag, &name, inst, ancestors);
        }
        record_assoc_sources(ctx, &mut frag, prefix, &name, inst);
    }

    for conn in &body.connectors {
        connect(ctx, &mut frag, prefix, conn);
    }
    frag
}

// ============================================================================
// Transformations
// ============================================================================

/// Create an instance with the transformation's ports, expressions, inferred
/// intra-transformation edges and condition pseudo-ports.
pub fn materialize_transform(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    instance_name: &str,
    tx: &TransformDecl,
) {
    let inst_id = frag.add_instance(ctx.mapping_id, instance_name, InstanceType::Transformation);

    let mut locals: Vec<&str> = Vec::new();
    for f in &tx.fields {
        let direction = Direction::classify(&f.port_type);
        let pid = frag.add_port(&inst_id, &f.name, &f.dtype, direction);
        if direction != Direction::Input && !f.expression.trim().is_empty() {
            frag.add_expression(&pid, ExprKind::Expr, f.expression.trim(), None);
        }
        if direction != Direction::Output {
            locals.push(&f.name);
        }
    }

    for f in &tx.fields {
        let direction = Direction::classify(&f.port_type);
        if direction == Direction::Input {
            continue;
        }
        let to = port_id(&inst_id, &f.name);
        if !f.expression.trim().is_empty() {
            for token in identifier_tokens(&f.expression) {
                let Some(src) = locals.iter().find(|l| l.eq_ignore_ascii_case(token)) else {
                    continue;
                };
                if src.eq_ignore_ascii_case(&f.name) {
                    continue;
                }
                if frag.add_edge(&port_id(&inst_id, src), &to) {
                    frag.stats.inferred_edges += 1;
                }
            }
        } else if direction == Direction::Output && ctx.options.infer_all_inputs_when_empty {
            for src in &locals {
                if frag.add_edge(&port_id(&inst_id, src), &to) {
                    frag.stats.inferred_edges += 1;
                }
            }
        }
    }

    for (attr_name, value) in &tx.attributes {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(kind) = ExprKind::from_attribute_name(attr_name) {
            let pid = frag.add_port(&inst_id, &format!("__{}__", kind.as_str()), "", Direction::Output);
            frag.add_expression(&pid, kind, value, Some(attr_name));
        }
    }

    if let Some((attr_name, sql)) = tx.sql_override() {
        apply_override(ctx, frag, &inst_id, instance_name, tx, attr_name, sql);
    }
}

// ============================================================================
// Instances
// ============================================================================

enum Binding<'a> {
    Source(Option<&'a TableDecl>),
    Target(Option<&'a TableDecl>),
    Mapplet(Option<&'a ContainerDecl>),
    Transformation(Option<&'a TransformDecl>),
}

/// Decide what an INSTANCE refers to.
///
/// An explicit type attribute wins. Without one, only an exact
/// (case-insensitive) match of the referenced object's name against the
/// folder's definitions decides; prefixes and substrings never do.
fn classify_instance<'a>(inst: &InstanceDecl, folder: &'a FolderCatalog) -> Binding<'a> {
    let ty = inst.type_attr.to_lowercase();
    let tx_type = inst.transformation_type.to_lowercase();
    let reference = if inst.ref_name.is_empty() {
        inst.name.as_str()
    } else {
        inst.ref_name.as_str()
    };

    if ty == "mapplet" || tx_type == "mapplet" {
        return Binding::Mapplet(folder.mapplet(reference));
    }
    if ty == "source" || tx_type == "source definition" {
        return Binding::Source(folder.source(reference));
    }
    if ty == "target" || tx_type == "target definition" {
        return Binding::Target(folder.target(reference));
    }
    if !ty.is_empty() || !tx_type.is_empty() {
        return Binding::Transformation(folder.reusable_transform(reference));
    }

    if let Some(t) = folder.target(reference) {
        Binding::Target(Some(t))
    } else if let Some(s) = folder.source(reference) {
        Binding::Source(Some(s))
    } else if let Some(m) = folder.mapplet(reference) {
        Binding::Mapplet(Some(m))
    } else {
        Binding::Transformation(folder.reusable_transform(reference))
    }
}

fn bind_instance(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    name: &str,
    inst: &InstanceDecl,
    ancestors: &[String],
) {
    match classify_instance(inst, ctx.folder) {
        Binding::Source(Some(table)) => bind_table(ctx, frag, name, table, PhysKind::Source),
        Binding::Source(None) => {
            frag.add_instance(ctx.mapping_id, name, InstanceType::Source);
        }
        Binding::Target(Some(table)) => bind_table(ctx, frag, name, table, PhysKind::Target),
        Binding::Target(None) => {
            frag.add_instance(ctx.mapping_id, name, InstanceType::Target);
        }
        Binding::Mapplet(Some(def)) => {
            let inlined = inline_mapplet(ctx, def, name, ancestors);
            frag.merge(inlined);
        }
        Binding::Mapplet(None) => {
            tracing::debug!(instance = %name, "mapplet definition not found; kept opaque");
            frag.add_instance(ctx.mapping_id, name, InstanceType::Transformation);
        }
        Binding::Transformation(Some(tx)) => materialize_transform(ctx, frag, name, tx),
        Binding::Transformation(None) => {
            frag.add_instance(ctx.mapping_id, name, InstanceType::Transformation);
        }
    }
}

/// Source (OUTPUT ports) or Target (INPUT ports) instance bound to its
/// physical table.
pub fn bind_table(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    name: &str,
    table: &TableDecl,
    kind: PhysKind,
) {
    let (itype, direction) = match kind {
        PhysKind::Source => (InstanceType::Source, Direction::Output),
        PhysKind::Target => (InstanceType::Target, Direction::Input),
    };
    let inst_id = frag.add_instance(ctx.mapping_id, name, itype);
    for f in &table.fields {
        frag.add_port(&inst_id, &f.name, &f.dtype, direction);
    }
    frag.bind_physical(
        ctx.mapping_id,
        &inst_id,
        kind,
        &table.db,
        &table.schema,
        &table.name,
        &table.full_name,
    );
}

fn record_assoc_sources(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    prefix: &str,
    name: &str,
    inst: &InstanceDecl,
) {
    if inst.assoc_sources.is_empty() {
        return;
    }
    let sq_id = instance_id(ctx.mapping_id, name);
    for src in &inst.assoc_sources {
        let src_id = instance_id(ctx.mapping_id, &qualify(prefix, src));
        let row = SqAssoc {
            mapping_id: ctx.mapping_id.to_string(),
            sq_instance_id: sq_id.clone(),
            source_instance_id: src_id,
        };
        if !frag.sq_assoc.contains(&row) {
            frag.sq_assoc.push(row);
        }
        if frag.has_instance(&sq_id) {
            let pid = frag.add_port(&sq_id, "__assoc_source__", "", Direction::Output);
            frag.add_expression(&pid, ExprKind::AssocSource, src, None);
        }
    }
}

// ============================================================================
// Connectors
// ============================================================================

#[derive(Clone, Copy)]
enum End {
    From,
    To,
}

fn connect(ctx: &BuildContext<'_>, frag: &mut GraphFragment, prefix: &str, conn: &ConnectorDecl) {
    let from_inst = ensure_instance(ctx, frag, prefix, &conn.from_instance, End::From);
    let to_inst = ensure_instance(ctx, frag, prefix, &conn.to_instance, End::To);
    let from = ensure_port(frag, &from_inst, &conn.from_port, End::From);
    let to = ensure_port(frag, &to_inst, &conn.to_port, End::To);
    frag.add_edge(&from, &to);
}

/// Resolve a connector endpoint's instance, creating it when the body never
/// declared it: a folder Source (preferred on the from-end) or Target
/// (preferred on the to-end) of the same name, else a placeholder.
fn ensure_instance(
    ctx: &BuildContext<'_>,
    frag: &mut GraphFragment,
    prefix: &str,
    local: &str,
    end: End,
) -> String {
    let name = qualify(prefix, local);
    let id = instance_id(ctx.mapping_id, &name);
    if frag.has_instance(&id) {
        return id;
    }

    let (first, second) = match end {
        End::From => (
            ctx.folder.source(local).map(|t| (t, PhysKind::Source)),
            ctx.folder.target(local).map(|t| (t, PhysKind::Target)),
        ),
        End::To => (
            ctx.folder.target(local).map(|t| (t, PhysKind::Target)),
            ctx.folder.source(local).map(|t| (t, PhysKind::Source)),
        ),
    };
    match first.or(second) {
        Some((table, kind)) => bind_table(ctx, frag, &name, table, kind),
        None => {
            frag.stats.placeholder_instances += 1;
            tracing::debug!(
                event = "dangling_edge_repaired",
                instance = %id,
                "placeholder instance created for connector"
            );
            frag.add_instance(ctx.mapping_id, &name, InstanceType::Transformation);
        }
    }
    id
}

fn ensure_port(frag: &mut GraphFragment, inst_id: &str, name: &str, end: End) -> String {
    if let Some(existing) = frag.find_port(inst_id, name) {
        return existing.to_string();
    }
    let direction = match end {
        End::From => Direction::Output,
        End::To => Direction::Input,
    };
    frag.stats.repaired_ports += 1;
    tracing::debug!(
        event = "dangling_edge_repaired",
        port = %port_id(inst_id, name),
        "placeholder port created for connector"
    );
    frag.add_port(inst_id, name, "", direction)
}
