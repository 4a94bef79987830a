//! Mapplet inlining.
//!
//! A mapplet instance `OUTER` becomes:
//!
//! - an instance `OUTER` whose ports are the mapplet's external ports
//!   (fields of its Input transformations as INPUT, of its Output
//!   transformations as OUTPUT)
//! - the mapplet body, built with every inner instance renamed `OUTER.INNER`
//! - bridge edges `OUTER:P -> OUTER.<input tx>:P` and
//!   `OUTER.<output tx>:P -> OUTER:P`
//!
//! so traversal passes through the mapplet as if it were part of the mapping.
//!
//! Connectors address external ports by bare name, so an Output field named
//! like an Input field shares the Input's outer port. Such collisions are
//! counted and logged.

use crate::builder::{build_body, qualify, BuildContext};
use crate::decl::{Boundary, ContainerDecl};
use crate::graph::GraphFragment;
use lineage_model::{instance_id, port_id, Direction, InstanceType};

/// Inline `def` as instance `outer` of the mapping in `ctx`.
///
/// Recursion into nested mapplets stops at `max_mapplet_depth` and on a
/// mapplet that (transitively) contains itself; those instances keep only
/// their external ports.
pub fn inline_mapplet(
    ctx: &BuildContext<'_>,
    def: &ContainerDecl,
    outer: &str,
    ancestors: &[String],
) -> GraphFragment {
    let mut frag = GraphFragment::default();
    let outer_id = frag.add_instance(ctx.mapping_id, outer, InstanceType::Transformation);

    for tx in def.boundary_transforms(Boundary::Input) {
        for f in &tx.fields {
            frag.add_port(&outer_id, &f.name, &f.dtype, Direction::Input);
        }
    }
    for tx in def.boundary_transforms(Boundary::Output) {
        for f in &tx.fields {
            if frag.find_port(&outer_id, &f.name).is_some() {
                frag.stats.mapplet_port_collisions += 1;
                tracing::debug!(
                    event = "mapplet_port_collision",
                    mapplet = %def.name,
                    instance = %outer_id,
                    port = %f.name,
                    "output field shares an input field's external port"
                );
                continue;
            }
            frag.add_port(&outer_id, &f.name, &f.dtype, Direction::Output);
        }
    }

    let key = def.name.to_uppercase();
    if ancestors.contains(&key) {
        tracing::warn!(mapplet = %def.name, instance = %outer_id, "recursive mapplet left opaque");
        return frag;
    }
    if ancestors.len() >= ctx.options.max_mapplet_depth {
        tracing::warn!(
            mapplet = %def.name,
            instance = %outer_id,
            depth = ancestors.len(),
            "mapplet nesting limit reached; left opaque"
        );
        return frag;
    }

    let mut chain = ancestors.to_vec();
    chain.push(key);
    let body = build_body(ctx, def, outer, &chain);
    frag.merge(body);

    for tx in def.boundary_transforms(Boundary::Input) {
        let inner = instance_id(ctx.mapping_id, &qualify(outer, &tx.name));
        for f in &tx.fields {
            frag.add_edge(&port_id(&outer_id, &f.name), &port_id(&inner, &f.name));
        }
    }
    for tx in def.boundary_transforms(Boundary::Output) {
        let inner = instance_id(ctx.mapping_id, &qualify(outer, &tx.name));
        for f in &tx.fields {
            frag.add_edge(&port_id(&inner, &f.name), &port_id(&outer_id, &f.name));
        }
    }

    frag.stats.inlined_mapplets += 1;
    tracing::debug!(mapplet = %def.name, instance = %outer_id, "mapplet inlined");
    frag
}
