//! Traversal tests over hand-built graphs.

use lineage_engine::{CrossWorkflowPolicy, LineageEngine, LineageOptions};
use lineage_model::*;
use lineage_store::Store;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Writes graph rows straight into a store.
struct Graph {
    store: Arc<Store>,
}

impl Graph {
    fn new() -> Self {
        Self {
            store: Arc::new(Store::in_memory()),
        }
    }

    fn mapping(&self, folder: &str, name: &str) -> String {
        let id = mapping_id(folder, name);
        self.store
            .upsert_rows(&[Mapping {
                mapping_id: id.clone(),
                name: name.into(),
                folder: folder.into(),
            }])
            .unwrap();
        id
    }

    fn instance(&self, mid: &str, name: &str, kind: InstanceType) -> String {
        let id = instance_id(mid, name);
        self.store
            .insert_rows(&[Instance {
                instance_id: id.clone(),
                mapping_id: mid.into(),
                kind,
                name: name.into(),
            }])
            .unwrap();
        id
    }

    fn port(&self, inst: &str, name: &str, direction: Direction) -> String {
        let id = port_id(inst, name);
        self.store
            .insert_rows(&[Port {
                port_id: id.clone(),
                instance_id: inst.into(),
                name: name.into(),
                dtype: String::new(),
                direction,
            }])
            .unwrap();
        id
    }

    fn edge(&self, from: &str, to: &str) {
        self.store.insert_rows(&[Edge::new(from, to)]).unwrap();
    }

    fn expr(&self, port: &str, kind: ExprKind, raw: &str) {
        self.store
            .insert_rows(&[Expression {
                port_id: port.into(),
                kind,
                raw: raw.into(),
                meta: None,
            }])
            .unwrap();
    }

    fn bind(&self, mid: &str, inst: &str, role: PhysKind, full: &str) {
        let oid = object_id(role, full);
        self.store
            .insert_rows(&[PhysicalObject {
                object_id: oid.clone(),
                kind: role,
                db: String::new(),
                schema: String::new(),
                name: full.into(),
                full_name: full.into(),
            }])
            .unwrap();
        self.store
            .insert_rows(&[InstancePhys {
                instance_id: inst.into(),
                object_id: oid.clone(),
                role,
            }])
            .unwrap();
        match role {
            PhysKind::Source => self.store.insert_rows(&[MapSource {
                mapping_id: mid.into(),
                object_id: oid,
            }]),
            PhysKind::Target => self.store.insert_rows(&[MapTarget {
                mapping_id: mid.into(),
                object_id: oid,
            }]),
        }
        .unwrap();
    }

    /// Mapping with `Source -> Target` on one column; returns the mapping id.
    fn copy_mapping(&self, name: &str, src_full: &str, tgt_full: &str, column: &str) -> String {
        let mid = self.mapping("F", name);
        let s = self.instance(&mid, &format!("SRC_{name}"), InstanceType::Source);
        let t = self.instance(&mid, &format!("TGT_{name}"), InstanceType::Target);
        let sp = self.port(&s, column, Direction::Output);
        let tp = self.port(&t, column, Direction::Input);
        self.edge(&sp, &tp);
        self.bind(&mid, &s, PhysKind::Source, src_full);
        self.bind(&mid, &t, PhysKind::Target, tgt_full);
        mid
    }

    fn engine(&self) -> LineageEngine {
        LineageEngine::new(self.store.clone())
    }
}

fn cross_rows(rows: &[LineageRow]) -> Vec<&LineageRow> {
    rows.iter().filter(|r| r.stage == Stage::CrossWorkflow).collect()
}

#[test]
fn test_unknown_field_yields_nothing() {
    let g = Graph::new();
    g.copy_mapping("M1", "A", "B", "AMT");
    assert!(g.engine().upstream_lineage("NOPE", 100).unwrap().is_empty());
    assert!(g.engine().upstream_lineage("", 100).unwrap().is_empty());
}

#[test]
fn test_candidates_strip_qualifiers_and_prefer_wired_sinks() {
    let g = Graph::new();
    g.copy_mapping("M2", "A", "B", "AMT");
    let mid = g.mapping("F", "M1");
    let t = g.instance(&mid, "T_EMPTY", InstanceType::Target);
    g.port(&t, "amt", Direction::Input);
    let x = g.instance(&mid, "EXP", InstanceType::Transformation);
    let sink = g.port(&x, "AMT", Direction::Input);
    let out = g.port(&x, "AMT_OUT", Direction::Output);
    g.port(&x, "AMTX", Direction::Input);
    g.edge(&out, &sink);

    let cands = g.engine().find_target_candidates("DW.T1.Amt").unwrap();
    let ids: Vec<_> = cands.iter().map(|c| c.port_id.as_str()).collect();
    assert_eq!(ids, vec!["F:M1:EXP:AMT", "F:M2:TGT_M2:AMT", "F:M1:T_EMPTY:amt"]);
    assert_eq!(cands[1].mapping_name, "M2");
    assert_eq!(cands[1].instance_name, "TGT_M2");
}

#[test]
fn test_chain_levels_and_expression_resolution() {
    let g = Graph::new();
    let mid = g.mapping("F1", "M1");
    let s = g.instance(&mid, "S1", InstanceType::Source);
    let e = g.instance(&mid, "EXP1", InstanceType::Transformation);
    let t = g.instance(&mid, "T1", InstanceType::Target);
    let s_amt = g.port(&s, "AMT", Direction::Output);
    let in_amt = g.port(&e, "IN_AMT", Direction::Input);
    let v = g.port(&e, "V_AMT", Direction::Variable);
    let out = g.port(&e, "AMT", Direction::Output);
    let t_amt = g.port(&t, "AMT", Direction::Input);
    g.expr(&v, ExprKind::Expr, "IN_AMT * 1.1");
    g.expr(&out, ExprKind::Expr, "v_amt");
    g.edge(&s_amt, &in_amt);
    g.edge(&in_amt, &v);
    g.edge(&v, &out);
    g.edge(&out, &t_amt);

    let rows = g.engine().upstream_lineage("AMT", 100).unwrap();
    let hops: Vec<_> = rows
        .iter()
        .map(|r| (r.level, r.from_port.as_str(), r.to_port.as_str(), r.operation.as_str()))
        .collect();
    assert_eq!(
        hops,
        vec![
            (1, "AMT", "AMT", "compute"),
            (2, "V_AMT", "AMT", "compute"),
            (3, "IN_AMT", "V_AMT", "compute"),
            (4, "AMT", "IN_AMT", "passthrough"),
        ]
    );
    // Output port aliasing the variable shows the variable's formula.
    assert_eq!(rows[0].expression, "v_amt");
    assert_eq!(rows[1].expression, "IN_AMT * 1.1");
    assert_eq!(rows[2].expression, "IN_AMT * 1.1");
    assert_eq!(rows[3].from_type, InstanceType::Source);
    assert!(rows.iter().all(|r| r.chain_id == 1 && r.stage == Stage::Mapping));
    assert_eq!(
        rows.iter().map(|r| r.step_no).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(rows[0].evidence, "F1:M1:EXP1:AMT->F1:M1:T1:AMT");
}

#[test]
fn test_join_condition_comes_from_the_expression_owner() {
    let g = Graph::new();
    let mid = g.mapping("F", "M");
    let j = g.instance(&mid, "JNR", InstanceType::Transformation);
    let t = g.instance(&mid, "T", InstanceType::Target);
    let a = g.port(&j, "A", Direction::Input);
    let id = g.port(&j, "ID", Direction::Output);
    let cond = g.port(&j, "__join__", Direction::Output);
    let tid = g.port(&t, "ID", Direction::Input);
    g.expr(&id, ExprKind::Expr, "A");
    g.expr(&cond, ExprKind::Join, "A = B");
    g.edge(&a, &id);
    g.edge(&id, &tid);

    let rows = g.engine().upstream_lineage("ID", 100).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.join_condition == "A = B"));
}

#[test]
fn test_join_condition_does_not_leak_to_other_instances() {
    let g = Graph::new();
    let mid = g.mapping("F", "M");
    let exp = g.instance(&mid, "JNR", InstanceType::Transformation);
    let other = g.instance(&mid, "JNR_ALT", InstanceType::Transformation);
    let t = g.instance(&mid, "T", InstanceType::Target);
    let a = g.port(&exp, "A", Direction::Input);
    let id = g.port(&exp, "ID", Direction::Output);
    let cond = g.port(&other, "__join__", Direction::Output);
    let tid = g.port(&t, "ID", Direction::Input);
    g.expr(&cond, ExprKind::Join, "X = Y");
    g.edge(&a, &id);
    g.edge(&id, &tid);

    let rows = g.engine().upstream_lineage("ID", 100).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.join_condition.is_empty()));
}

#[test]
fn test_cycle_terminates_with_each_edge_once() {
    let g = Graph::new();
    let mid = g.mapping("F", "M");
    let x = g.instance(&mid, "X", InstanceType::Transformation);
    let t = g.instance(&mid, "T", InstanceType::Target);
    let a = g.port(&x, "A", Direction::Variable);
    let b = g.port(&x, "B", Direction::Variable);
    let tc = g.port(&t, "C", Direction::Input);
    g.edge(&a, &b);
    g.edge(&b, &a);
    g.edge(&b, &tc);

    let rows = g.engine().upstream_lineage("C", 10_000).unwrap();
    assert_eq!(rows.len(), 3);
    let pairs: HashSet<_> = rows.iter().map(|r| (&r.from_port, &r.to_port)).collect();
    assert_eq!(pairs.len(), rows.len());
}

#[test]
fn test_unique_upstream_is_stitched_and_followed() {
    let g = Graph::new();
    g.copy_mapping("LOAD_STG", "RAW.ORDERS", "DW.STG.ORDERS", "AMT");
    g.copy_mapping("LOAD_DW", "DW.STG.ORDERS", "DW.MART.ORDERS", "AMT");

    let rows = g.engine().upstream_lineage("MART.ORDERS.AMT", 100).unwrap();
    let chain1: Vec<_> = rows.iter().filter(|r| r.chain_id == 1).collect();
    assert!(chain1.iter().all(|r| r.mapping.starts_with("LOAD_DW") || r.mapping == "LOAD_STG"));

    let cross = cross_rows(&rows);
    assert_eq!(cross.len(), 1);
    let c = cross[0];
    assert_eq!(c.chain_id, 1);
    assert_eq!(c.mapping, "LOAD_DW -> LOAD_STG");
    assert_eq!(c.from_instance, "(TARGET)");
    assert_eq!(c.to_instance, "(SOURCE)");
    assert_eq!(c.operation, "cross_workflow (exact)");
    assert_eq!(c.evidence, "DW.STG.ORDERS");
    assert_eq!(c.level, 1);

    // Traversal continues inside the upstream mapping.
    assert!(chain1
        .iter()
        .any(|r| r.mapping == "LOAD_STG" && r.from_instance == "SRC_LOAD_STG" && r.level == 2));
}

#[test]
fn test_ambiguous_upstream_is_not_stitched() {
    let g = Graph::new();
    g.copy_mapping("UP_A", "RAW.A", "DW.STG.X", "C");
    g.copy_mapping("UP_B", "RAW.B", "DW.STG.X", "C");
    g.copy_mapping("DOWN", "DW.STG.X", "DW.MART.X", "C");

    let rows = g.engine().upstream_lineage("C", 100).unwrap();
    assert!(!rows.is_empty());
    assert!(cross_rows(&rows).is_empty());
}

#[test]
fn test_fuzzy_mode_is_opt_in() {
    let g = Graph::new();
    g.copy_mapping("UP", "RAW.C", "DW.STG.C", "CUST_NAM");
    g.copy_mapping("DOWN", "DW.STG.C", "DW.MART.C", "CUST_NAME");

    let strict = g.engine().upstream_lineage("CUST_NAME", 100).unwrap();
    assert!(cross_rows(&strict).is_empty());

    let fuzzy = g
        .engine()
        .with_options(LineageOptions {
            cross_workflow: CrossWorkflowPolicy::FuzzyAll { threshold: 0.82 },
            ..Default::default()
        })
        .upstream_lineage("CUST_NAME", 100)
        .unwrap();
    let cross = cross_rows(&fuzzy);
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].operation, "cross_workflow (fuzzy)");
    assert_eq!(cross[0].from_port, "CUST_NAM");
    assert_eq!(cross[0].to_port, "CUST_NAME");
}

#[test]
fn test_row_budget_caps_total_output() {
    let g = Graph::new();
    for i in 0..5 {
        g.copy_mapping(&format!("M{i}"), &format!("S{i}"), &format!("T{i}"), "AMT");
    }
    assert_eq!(g.engine().upstream_lineage("AMT", 100).unwrap().len(), 5);
    assert_eq!(g.engine().upstream_lineage("AMT", 3).unwrap().len(), 3);
    assert!(g.engine().upstream_lineage("AMT", 0).unwrap().is_empty());
}

#[test]
fn test_repeated_queries_are_identical() {
    let g = Graph::new();
    g.copy_mapping("LOAD_STG", "RAW.ORDERS", "DW.STG.ORDERS", "AMT");
    g.copy_mapping("LOAD_DW", "DW.STG.ORDERS", "DW.MART.ORDERS", "AMT");
    let engine = g.engine();
    let a = serde_json::to_string(&engine.upstream_lineage("AMT", 100).unwrap()).unwrap();
    let b = serde_json::to_string(&engine.upstream_lineage("AMT", 100).unwrap()).unwrap();
    assert_eq!(a, b);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_graphs_terminate_without_repeating_edges(
        edges in proptest::collection::vec((0usize..8, 0usize..8), 0..24),
        max_rows in 1usize..40,
    ) {
        let g = Graph::new();
        let mid = g.mapping("F", "M");
        let x = g.instance(&mid, "X", InstanceType::Transformation);
        let t = g.instance(&mid, "T", InstanceType::Target);
        let ports: Vec<String> = (0..8)
            .map(|i| g.port(&x, &format!("P{i}"), Direction::Variable))
            .collect();
        let sink = g.port(&t, "OUT", Direction::Input);
        g.edge(&ports[0], &sink);
        for (a, b) in &edges {
            if a != b {
                g.edge(&ports[*a], &ports[*b]);
            }
        }

        let rows = g.engine().upstream_lineage("OUT", max_rows).unwrap();
        prop_assert!(rows.len() <= max_rows);
        let pairs: HashSet<_> = rows.iter().map(|r| (&r.from_port, &r.to_port)).collect();
        prop_assert_eq!(pairs.len(), rows.len());
        for (i, r) in rows.iter().enumerate() {
            prop_assert_eq!(r.step_no, i + 1);
        }
    }
}
