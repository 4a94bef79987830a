//! In-memory graph buckets produced by one parse, before persistence.

use lineage_model::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Counters for decisions taken while building a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub inferred_edges: usize,
    pub repaired_ports: usize,
    pub placeholder_instances: usize,
    pub parsed_overrides: usize,
    pub unparsed_overrides: usize,
    pub inlined_mapplets: usize,
    /// Mapplet Output fields sharing a name with an Input field.
    pub mapplet_port_collisions: usize,
}

impl BuildStats {
    fn absorb(&mut self, other: BuildStats) {
        self.inferred_edges += other.inferred_edges;
        self.repaired_ports += other.repaired_ports;
        self.placeholder_instances += other.placeholder_instances;
        self.parsed_overrides += other.parsed_overrides;
        self.unparsed_overrides += other.unparsed_overrides;
        self.inlined_mapplets += other.inlined_mapplets;
        self.mapplet_port_collisions += other.mapplet_port_collisions;
    }
}

/// A set of rows for every table except `mappings`, deduplicated by key as
/// they are added. Mapplet inlining returns one of these to be merged.
#[derive(Debug, Clone, Default)]
pub struct GraphFragment {
    pub instances: Vec<Instance>,
    pub ports: Vec<Port>,
    pub edges: Vec<Edge>,
    pub expressions: Vec<Expression>,
    pub physical_objects: Vec<PhysicalObject>,
    pub map_sources: Vec<MapSource>,
    pub map_targets: Vec<MapTarget>,
    pub instance_phys: Vec<InstancePhys>,
    pub sq_assoc: Vec<SqAssoc>,
    pub stats: BuildStats,
    instance_idx: HashMap<String, usize>,
    /// Upper-cased port id -> declared port id.
    port_idx: HashMap<String, String>,
    edge_keys: HashSet<(String, String)>,
    expr_keys: HashSet<(String, ExprKind, String)>,
    object_keys: HashSet<String>,
    link_keys: HashSet<(PhysKind, String, String)>,
}

impl GraphFragment {
    pub fn instance(&self, instance_id: &str) -> Option<&Instance> {
        self.instance_idx
            .get(instance_id)
            .map(|&i| &self.instances[i])
    }

    pub fn has_instance(&self, instance_id: &str) -> bool {
        self.instance_idx.contains_key(instance_id)
    }

    /// Declared port id for `instance_id:name`, matching the name
    /// case-insensitively.
    pub fn find_port(&self, instance_id: &str, name: &str) -> Option<&str> {
        self.port_idx
            .get(&port_id(instance_id, name).to_uppercase())
            .map(String::as_str)
    }

    /// Add an instance unless its id already exists; returns the id.
    pub fn add_instance(&mut self, mapping_id: &str, name: &str, kind: InstanceType) -> String {
        let id = instance_id(mapping_id, name);
        if !self.instance_idx.contains_key(&id) {
            self.instance_idx.insert(id.clone(), self.instances.len());
            self.instances.push(Instance {
                instance_id: id.clone(),
                mapping_id: mapping_id.to_string(),
                kind,
                name: name.to_string(),
            });
        }
        id
    }

    /// Add a port unless one with the same (case-insensitive) name exists on
    /// the instance; returns the declared port id either way.
    pub fn add_port(
        &mut self,
        instance_id: &str,
        name: &str,
        dtype: &str,
        direction: Direction,
    ) -> String {
        if let Some(existing) = self.find_port(instance_id, name) {
            return existing.to_string();
        }
        let id = port_id(instance_id, name);
        self.port_idx.insert(id.to_uppercase(), id.clone());
        self.ports.push(Port {
            port_id: id.clone(),
            instance_id: instance_id.to_string(),
            name: name.to_string(),
            dtype: dtype.to_string(),
            direction,
        });
        id
    }

    /// Add a directed edge; self-loops and repeats are dropped.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        let key = (from.to_string(), to.to_string());
        if !self.edge_keys.insert(key) {
            return false;
        }
        self.edges.push(Edge::new(from, to));
        true
    }

    pub fn add_expression(&mut self, port_id: &str, kind: ExprKind, raw: &str, meta: Option<&str>) {
        let key = (port_id.to_string(), kind, raw.to_string());
        if self.expr_keys.insert(key) {
            self.expressions.push(Expression {
                port_id: port_id.to_string(),
                kind,
                raw: raw.to_string(),
                meta: meta.map(str::to_string),
            });
        }
    }

    /// Register a physical object and bind it to an instance of `mapping_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn bind_physical(
        &mut self,
        mapping_id: &str,
        instance_id: &str,
        kind: PhysKind,
        db: &str,
        schema: &str,
        name: &str,
        full: &str,
    ) -> String {
        let oid = object_id(kind, full);
        if self.object_keys.insert(oid.clone()) {
            self.physical_objects.push(PhysicalObject {
                object_id: oid.clone(),
                kind,
                db: db.to_string(),
                schema: schema.to_string(),
                name: name.to_string(),
                full_name: full.to_string(),
            });
        }
        if self
            .link_keys
            .insert((kind, mapping_id.to_string(), oid.clone()))
        {
            match kind {
                PhysKind::Source => self.map_sources.push(MapSource {
                    mapping_id: mapping_id.to_string(),
                    object_id: oid.clone(),
                }),
                PhysKind::Target => self.map_targets.push(MapTarget {
                    mapping_id: mapping_id.to_string(),
                    object_id: oid.clone(),
                }),
            }
        }
        let binding = InstancePhys {
            instance_id: instance_id.to_string(),
            object_id: oid.clone(),
            role: kind,
        };
        if !self.instance_phys.contains(&binding) {
            self.instance_phys.push(binding);
        }
        oid
    }

    /// Append another fragment, keeping first-seen rows on key collisions.
    pub fn merge(&mut self, other: GraphFragment) {
        for inst in other.instances {
            if !self.instance_idx.contains_key(&inst.instance_id) {
                self.instance_idx
                    .insert(inst.instance_id.clone(), self.instances.len());
                self.instances.push(inst);
            }
        }
        for port in other.ports {
            let key = port.port_id.to_uppercase();
            if !self.port_idx.contains_key(&key) {
                self.port_idx.insert(key, port.port_id.clone());
                self.ports.push(port);
            }
        }
        for edge in other.edges {
            self.add_edge(&edge.from_port_id, &edge.to_port_id);
        }
        for e in other.expressions {
            self.add_expression(&e.port_id, e.kind, &e.raw, e.meta.as_deref());
        }
        for obj in other.physical_objects {
            if self.object_keys.insert(obj.object_id.clone()) {
                self.physical_objects.push(obj);
            }
        }
        for ms in other.map_sources {
            if self
                .link_keys
                .insert((PhysKind::Source, ms.mapping_id.clone(), ms.object_id.clone()))
            {
                self.map_sources.push(ms);
            }
        }
        for mt in other.map_targets {
            if self
                .link_keys
                .insert((PhysKind::Target, mt.mapping_id.clone(), mt.object_id.clone()))
            {
                self.map_targets.push(mt);
            }
        }
        for b in other.instance_phys {
            if !self.instance_phys.contains(&b) {
                self.instance_phys.push(b);
            }
        }
        for a in other.sq_assoc {
            if !self.sq_assoc.contains(&a) {
                self.sq_assoc.push(a);
            }
        }
        self.stats.absorb(other.stats);
    }
}

/// One parsed mapping, ready to persist.
#[derive(Debug, Clone)]
pub struct MappingGraph {
    pub mapping: Mapping,
    pub graph: GraphFragment,
}

/// Summary of one parsed mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub mapping_id: String,
    pub instances: usize,
    pub ports: usize,
    pub edges: usize,
    pub expressions: usize,
    #[serde(flatten)]
    pub stats: BuildStats,
}

impl MappingGraph {
    pub fn report(&self) -> ParseReport {
        ParseReport {
            mapping_id: self.mapping.mapping_id.clone(),
            instances: self.graph.instances.len(),
            ports: self.graph.ports.len(),
            edges: self.graph.edges.len(),
            expressions: self.graph.expressions.len(),
            stats: self.graph.stats,
        }
    }
}
