//! Per-query in-memory indices over the Record Store.
//!
//! A query loads the tables it needs once and never reads the store again,
//! so concurrent writers cannot change the graph under a running traversal.
//! Every multi-valued index is sorted, which keeps traversal order
//! independent of store row order.

use lineage_model::*;
use lineage_store::{Result, Store};
use std::collections::{BTreeMap, HashMap, HashSet};

pub struct Snapshot {
    mappings: HashMap<String, Mapping>,
    instances: HashMap<String, Instance>,
    /// Sorted by port id.
    ports: BTreeMap<String, Port>,
    /// Upper-cased port id -> declared port id.
    port_ci: HashMap<String, String>,
    /// instance_id -> sorted port ids.
    ports_by_instance: HashMap<String, Vec<String>>,
    /// to_port_id -> sorted from_port_ids.
    upstream: HashMap<String, Vec<String>>,
    has_outgoing: HashSet<String>,
    /// port_id -> expressions in store order.
    expressions: HashMap<String, Vec<Expression>>,
    /// instance_id -> join conditions in store order.
    joins: HashMap<String, Vec<Expression>>,
    objects: HashMap<String, PhysicalObject>,
    /// instance_id -> bindings, sorted by object id.
    bindings: HashMap<String, Vec<InstancePhys>>,
    /// full name -> sorted Target-bound instance ids.
    targets_by_full_name: BTreeMap<String, Vec<String>>,
}

impl Snapshot {
    pub fn load(store: &Store) -> Result<Self> {
        let mappings = store
            .load::<Mapping>()?
            .into_iter()
            .map(|m| (m.mapping_id.clone(), m))
            .collect();
        let instances: HashMap<String, Instance> = store
            .load::<Instance>()?
            .into_iter()
            .map(|i| (i.instance_id.clone(), i))
            .collect();
        let ports: BTreeMap<String, Port> = store
            .load::<Port>()?
            .into_iter()
            .map(|p| (p.port_id.clone(), p))
            .collect();
        let port_ci = ports
            .keys()
            .map(|id| (id.to_uppercase(), id.clone()))
            .collect();
        let mut ports_by_instance: HashMap<String, Vec<String>> = HashMap::new();
        for p in ports.values() {
            ports_by_instance
                .entry(p.instance_id.clone())
                .or_default()
                .push(p.port_id.clone());
        }

        let mut upstream: HashMap<String, Vec<String>> = HashMap::new();
        let mut has_outgoing = HashSet::new();
        for edge in store.load::<Edge>()? {
            has_outgoing.insert(edge.from_port_id.clone());
            upstream
                .entry(edge.to_port_id)
                .or_default()
                .push(edge.from_port_id);
        }
        for froms in upstream.values_mut() {
            froms.sort();
            froms.dedup();
        }

        let mut expressions: HashMap<String, Vec<Expression>> = HashMap::new();
        let mut joins: HashMap<String, Vec<Expression>> = HashMap::new();
        for expr in store.load::<Expression>()? {
            if expr.kind == ExprKind::Join {
                if let Some((inst, _)) = split_port_id(&expr.port_id) {
                    joins.entry(inst.to_string()).or_default().push(expr.clone());
                }
            }
            expressions.entry(expr.port_id.clone()).or_default().push(expr);
        }

        let objects: HashMap<String, PhysicalObject> = store
            .load::<PhysicalObject>()?
            .into_iter()
            .map(|o| (o.object_id.clone(), o))
            .collect();

        let mut bindings: HashMap<String, Vec<InstancePhys>> = HashMap::new();
        let mut targets_by_full_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for b in store.load::<InstancePhys>()? {
            if b.role == PhysKind::Target {
                if let Some(obj) = objects.get(&b.object_id) {
                    targets_by_full_name
                        .entry(obj.full_name.clone())
                        .or_default()
                        .push(b.instance_id.clone());
                }
            }
            bindings.entry(b.instance_id.clone()).or_default().push(b);
        }
        for list in bindings.values_mut() {
            list.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        }
        for list in targets_by_full_name.values_mut() {
            list.sort();
            list.dedup();
        }

        Ok(Self {
            mappings,
            instances,
            ports,
            port_ci,
            ports_by_instance,
            upstream,
            has_outgoing,
            expressions,
            joins,
            objects,
            bindings,
            targets_by_full_name,
        })
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.get(port_id)
    }

    /// Port of `instance_id` named `name`, case-insensitively.
    pub fn port_named(&self, instance_id: &str, name: &str) -> Option<&Port> {
        let key = port_id(instance_id, name).to_uppercase();
        self.port_ci.get(&key).and_then(|id| self.ports.get(id))
    }

    /// Ports of an instance in port id order.
    pub fn ports_of<'s>(&'s self, instance_id: &str) -> impl Iterator<Item = &'s Port> + 's {
        self.ports_by_instance
            .get(instance_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.ports.get(id))
    }

    pub fn instance(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.get(instance_id)
    }

    pub fn mapping_name<'s>(&'s self, mapping_id: &'s str) -> &'s str {
        self.mappings
            .get(mapping_id)
            .map(|m| m.name.as_str())
            .unwrap_or(mapping_id)
    }

    pub fn upstream_of(&self, port_id: &str) -> &[String] {
        self.upstream.get(port_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_inbound(&self, port_id: &str) -> bool {
        self.upstream.contains_key(port_id)
    }

    pub fn has_outgoing(&self, port_id: &str) -> bool {
        self.has_outgoing.contains(port_id)
    }

    /// First plain (`expr` kind) expression text on a port, trimmed.
    pub fn expression_of(&self, port_id: &str) -> Option<&str> {
        self.expressions
            .get(port_id)?
            .iter()
            .find(|e| e.kind == ExprKind::Expr)
            .map(|e| e.raw.trim())
            .filter(|raw| !raw.is_empty())
    }

    /// First join condition recorded on any port of `instance_id`.
    pub fn join_condition_of(&self, instance_id: &str) -> Option<&str> {
        self.joins
            .get(instance_id)
            .and_then(|list| list.first())
            .map(|e| e.raw.as_str())
    }

    /// Full names of the physical objects an instance is bound to in `role`.
    pub fn full_names_of(&self, instance_id: &str, role: PhysKind) -> Vec<&str> {
        self.bindings
            .get(instance_id)
            .into_iter()
            .flatten()
            .filter(|b| b.role == role)
            .filter_map(|b| self.objects.get(&b.object_id))
            .map(|o| o.full_name.as_str())
            .collect()
    }

    pub fn targets_bound_to(&self, full_name: &str) -> &[String] {
        self.targets_by_full_name
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
