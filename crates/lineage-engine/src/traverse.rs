//! Backward traversal from sink ports.
//!
//! Each start port seeds one chain. A chain is a breadth-first walk over the
//! reverse edge index: processing a port at level `L` emits one row per
//! upstream edge at level `L + 1` and enqueues each not-yet-visited upstream
//! port. Upstream Source ports may hand off to a Target port in another
//! mapping that writes the same physical object.

use crate::matcher::best_match_with;
use crate::snapshot::Snapshot;
use crate::CrossWorkflowPolicy;
use lineage_model::*;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// `[A-Za-z_][A-Za-z0-9_]*`, ignoring surrounding whitespace.
pub fn is_bare_identifier(text: &str) -> bool {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Start ports
// ============================================================================

pub fn target_candidates(snap: &Snapshot, field: &str) -> Vec<TargetCandidate> {
    let wanted = strip_qualifier(field.trim()).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut found: Vec<(bool, TargetCandidate)> = Vec::new();
    for port in snap.ports() {
        if port.name.to_lowercase() != wanted {
            continue;
        }
        let Some(inst) = snap.instance(&port.instance_id) else {
            continue;
        };
        let is_sink = inst.kind == InstanceType::Target
            || (port.direction == Direction::Input && !snap.has_outgoing(&port.port_id));
        if !is_sink {
            continue;
        }
        found.push((
            snap.has_inbound(&port.port_id),
            TargetCandidate {
                port_id: port.port_id.clone(),
                instance_id: inst.instance_id.clone(),
                port_name: port.name.clone(),
                instance_name: inst.name.clone(),
                mapping_name: snap.mapping_name(&inst.mapping_id).to_string(),
            },
        ));
    }

    // Wired sinks first.
    found.sort_by(|(a_in, a), (b_in, b)| {
        b_in.cmp(a_in)
            .then_with(|| a.mapping_name.cmp(&b.mapping_name))
            .then_with(|| a.instance_name.cmp(&b.instance_name))
            .then_with(|| a.port_name.cmp(&b.port_name))
            .then_with(|| a.port_id.cmp(&b.port_id))
    });
    found.into_iter().map(|(_, c)| c).collect()
}

// ============================================================================
// Chains
// ============================================================================

/// All chains for `field`, at most `max_rows` rows in total.
pub fn upstream_lineage(
    snap: &Snapshot,
    field: &str,
    max_rows: usize,
    policy: CrossWorkflowPolicy,
) -> Vec<LineageRow> {
    let mut out: Vec<LineageRow> = Vec::new();
    for (idx, start) in target_candidates(snap, field).into_iter().enumerate() {
        let budget = max_rows.saturating_sub(out.len());
        if budget == 0 {
            tracing::debug!(field, max_rows, "row budget exhausted");
            break;
        }
        let mut rows = Chain::new(snap, idx + 1, policy, budget).walk(&start.port_id);
        order_chain(&mut rows);
        out.extend(rows);
    }
    out
}

/// Sort by `(level, stage, mapping, from_instance, from_port)` and number
/// the steps. Destination columns break the remaining ties.
fn order_chain(rows: &mut [LineageRow]) {
    rows.sort_by(|a, b| {
        (
            a.level,
            a.stage.as_str(),
            &a.mapping,
            &a.from_instance,
            &a.from_port,
            &a.to_instance,
            &a.to_port,
        )
            .cmp(&(
                b.level,
                b.stage.as_str(),
                &b.mapping,
                &b.from_instance,
                &b.from_port,
                &b.to_instance,
                &b.to_port,
            ))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.step_no = i + 1;
    }
}

struct Chain<'a> {
    snap: &'a Snapshot,
    chain_id: usize,
    policy: CrossWorkflowPolicy,
    budget: usize,
    visited: HashSet<String>,
    /// (full name, upstream mapping name, upper-cased column)
    stitched: HashSet<(String, String, String)>,
    queue: VecDeque<(String, usize)>,
    rows: Vec<LineageRow>,
}

impl<'a> Chain<'a> {
    fn new(snap: &'a Snapshot, chain_id: usize, policy: CrossWorkflowPolicy, budget: usize) -> Self {
        Self {
            snap,
            chain_id,
            policy,
            budget,
            visited: HashSet::new(),
            stitched: HashSet::new(),
            queue: VecDeque::new(),
            rows: Vec::new(),
        }
    }

    fn full(&self) -> bool {
        self.rows.len() >= self.budget
    }

    fn enqueue(&mut self, port_id: &str, level: usize) {
        if self.visited.insert(port_id.to_string()) {
            self.queue.push_back((port_id.to_string(), level));
        }
    }

    fn walk(mut self, start: &str) -> Vec<LineageRow> {
        let snap = self.snap;
        self.enqueue(start, 0);

        while let Some((current, level)) = self.queue.pop_front() {
            let Some(to) = snap.port(&current) else {
                continue;
            };
            let Some(to_inst) = snap.instance(&to.instance_id) else {
                continue;
            };
            for from_id in snap.upstream_of(&current) {
                if self.full() {
                    return self.rows;
                }
                let Some(from) = snap.port(from_id) else {
                    continue;
                };
                let Some(from_inst) = snap.instance(&from.instance_id) else {
                    continue;
                };

                let row = self.hop_row(level + 1, from, from_inst, to, to_inst);
                self.rows.push(row);
                self.enqueue(from_id, level + 1);

                if from_inst.kind == InstanceType::Source {
                    self.stitch(from, from_inst, level + 1);
                }
            }
        }
        self.rows
    }

    fn hop_row(
        &self,
        level: usize,
        from: &Port,
        from_inst: &Instance,
        to: &Port,
        to_inst: &Instance,
    ) -> LineageRow {
        let snap = self.snap;
        let (expression, owner) = match resolve_expression(snap, from, to) {
            Some((text, port)) => (text, port.instance_id.as_str()),
            None => ("", from.instance_id.as_str()),
        };
        LineageRow {
            chain_id: self.chain_id,
            step_no: 0,
            level,
            mapping: snap.mapping_name(&to_inst.mapping_id).to_string(),
            from_instance: from_inst.name.clone(),
            from_port: from.name.clone(),
            from_type: from_inst.kind,
            to_instance: to_inst.name.clone(),
            to_port: to.name.clone(),
            to_type: to_inst.kind,
            operation: (if expression.is_empty() { "passthrough" } else { "compute" }).to_string(),
            expression: expression.to_string(),
            join_condition: snap.join_condition_of(owner).unwrap_or("").to_string(),
            stage: Stage::Mapping,
            evidence: format!("{}->{}", from.port_id, to.port_id),
        }
    }

    /// Hand off from an upstream Source port to Target ports of other
    /// mappings bound to the same physical object.
    fn stitch(&mut self, source: &Port, source_inst: &Instance, level: usize) {
        let snap = self.snap;
        for full in snap.full_names_of(&source_inst.instance_id, PhysKind::Source) {
            // Candidate Target ports, grouped by mapping id.
            let mut by_mapping: BTreeMap<&str, Vec<(&Port, f64)>> = BTreeMap::new();
            for tgt_id in snap.targets_bound_to(full) {
                let Some(tgt) = snap.instance(tgt_id) else {
                    continue;
                };
                if tgt.mapping_id == source_inst.mapping_id {
                    continue;
                }
                let hit = match self.policy {
                    CrossWorkflowPolicy::StrictUnique => snap
                        .port_named(tgt_id, &source.name)
                        .filter(|p| p.direction == Direction::Input)
                        .map(|p| (p, 1.0)),
                    CrossWorkflowPolicy::FuzzyAll { threshold } => {
                        fuzzy_port(snap, tgt_id, &source.name, threshold)
                    }
                };
                if let Some(hit) = hit {
                    by_mapping.entry(tgt.mapping_id.as_str()).or_default().push(hit);
                }
            }

            let selected: Vec<(&Port, f64)> = match self.policy {
                CrossWorkflowPolicy::StrictUnique if by_mapping.len() == 1 => {
                    by_mapping.values().filter_map(|v| v.first().copied()).collect()
                }
                CrossWorkflowPolicy::StrictUnique => {
                    if by_mapping.len() > 1 {
                        tracing::debug!(
                            event = "ambiguous_upstream_skipped",
                            full_name = %full,
                            column = %source.name,
                            candidates = by_mapping.len(),
                            "cross-workflow handoff skipped"
                        );
                    }
                    Vec::new()
                }
                CrossWorkflowPolicy::FuzzyAll { .. } => {
                    by_mapping.values().filter_map(|v| v.first().copied()).collect()
                }
            };

            for (port, score) in selected {
                if self.full() {
                    return;
                }
                let Some(tgt_inst) = snap.instance(&port.instance_id) else {
                    continue;
                };
                let upstream_name = snap.mapping_name(&tgt_inst.mapping_id);
                let key = (
                    full.to_string(),
                    upstream_name.to_string(),
                    source.name.to_uppercase(),
                );
                if !self.stitched.insert(key) {
                    continue;
                }
                let operation = if score >= 1.0 {
                    "cross_workflow (exact)"
                } else {
                    "cross_workflow (fuzzy)"
                };
                self.rows.push(LineageRow {
                    chain_id: self.chain_id,
                    step_no: 0,
                    level,
                    mapping: format!(
                        "{} -> {}",
                        snap.mapping_name(&source_inst.mapping_id),
                        upstream_name
                    ),
                    from_instance: "(TARGET)".to_string(),
                    from_port: port.name.clone(),
                    from_type: InstanceType::Target,
                    to_instance: "(SOURCE)".to_string(),
                    to_port: source.name.clone(),
                    to_type: InstanceType::Source,
                    operation: operation.to_string(),
                    expression: String::new(),
                    join_condition: String::new(),
                    stage: Stage::CrossWorkflow,
                    evidence: full.to_string(),
                });
                self.enqueue(&port.port_id, level);
            }
        }
    }
}

/// The text shown for a hop and the port it came from.
///
/// The downstream port's formula wins, unless it is a bare reference to the
/// upstream port itself; then the upstream port's own formula is shown.
fn resolve_expression<'s>(snap: &'s Snapshot, from: &'s Port, to: &'s Port) -> Option<(&'s str, &'s Port)> {
    match snap.expression_of(&to.port_id) {
        Some(text) if is_bare_identifier(text) && text.eq_ignore_ascii_case(&from.name) => {
            snap.expression_of(&from.port_id).map(|t| (t, from))
        }
        Some(text) => Some((text, to)),
        None => snap.expression_of(&from.port_id).map(|t| (t, from)),
    }
}

fn fuzzy_port<'s>(snap: &'s Snapshot, instance_id: &str, column: &str, threshold: f64) -> Option<(&'s Port, f64)> {
    let inputs: Vec<&Port> = snap
        .ports_of(instance_id)
        .filter(|p| p.direction == Direction::Input)
        .collect();
    let names: Vec<&str> = inputs.iter().map(|p| p.name.as_str()).collect();
    let (name, score) = best_match_with(column, names.as_slice(), threshold);
    if name.is_empty() {
        return None;
    }
    inputs.into_iter().find(|p| p.name == name).map(|p| (p, score))
}
