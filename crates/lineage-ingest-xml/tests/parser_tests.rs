//! End-to-end parser tests: XML text in, store rows out.

use lineage_ingest_sql::SqlOverrideParser;
use lineage_ingest_xml::{load_batch, ParseError, ParseOptions, WorkflowParser};
use lineage_model::*;
use lineage_store::{Record, Store};
use std::collections::BTreeMap;
use std::sync::Arc;

const SIMPLE: &str = r#"<?xml version="1.0" encoding="Windows-1252"?>
<POWERMART><REPOSITORY NAME="REP"><FOLDER NAME="F1">
  <SOURCE NAME="S1" DBDNAME="stg" OWNERNAME="raw">
    <SOURCEFIELD NAME="AMT" DATATYPE="decimal" PRECISION="12" SCALE="2"/>
  </SOURCE>
  <TARGET NAME="T1" DBDNAME="dw" OWNERNAME="fin">
    <TARGETFIELD NAME="AMT" DATATYPE="decimal"/>
  </TARGET>
  <MAPPING NAME="M1">
    <TRANSFORMATION NAME="EXP1" TYPE="Expression">
      <TRANSFORMFIELD NAME="IN_AMT" PORTTYPE="INPUT" DATATYPE="decimal"/>
      <TRANSFORMFIELD NAME="AMT" PORTTYPE="OUTPUT" DATATYPE="decimal" EXPRESSION="IN_AMT * 2"/>
      <TRANSFORMFIELD NAME="LOADED_AT" PORTTYPE="OUTPUT" DATATYPE="date/time" EXPRESSION=""/>
    </TRANSFORMATION>
    <INSTANCE NAME="S1" TYPE="SOURCE" TRANSFORMATION_NAME="S1"/>
    <INSTANCE NAME="EXP1" TYPE="TRANSFORMATION" TRANSFORMATION_NAME="EXP1"/>
    <INSTANCE NAME="T1" TYPE="TARGET" TRANSFORMATION_NAME="T1"/>
    <CONNECTOR FROMINSTANCE="S1" FROMFIELD="AMT" TOINSTANCE="EXP1" TOFIELD="IN_AMT"/>
    <CONNECTOR FROMINSTANCE="EXP1" FROMFIELD="AMT" TOINSTANCE="T1" TOFIELD="AMT"/>
  </MAPPING>
</FOLDER></REPOSITORY></POWERMART>"#;

const WITH_MAPPLET: &str = r#"<POWERMART><REPOSITORY><FOLDER NAME="F2">
  <SOURCE NAME="SRC"><SOURCEFIELD NAME="V" DATATYPE="string"/></SOURCE>
  <TARGET NAME="TGT"><TARGETFIELD NAME="V" DATATYPE="string"/></TARGET>
  <MAPPLET NAME="MPLT_CLEAN">
    <TRANSFORMATION NAME="INPUT" TYPE="Input Transformation">
      <TRANSFORMFIELD NAME="RAW" PORTTYPE="OUTPUT"/>
    </TRANSFORMATION>
    <TRANSFORMATION NAME="EXP_TRIM" TYPE="Expression">
      <TRANSFORMFIELD NAME="RAW" PORTTYPE="INPUT"/>
      <TRANSFORMFIELD NAME="CLEAN" PORTTYPE="OUTPUT" EXPRESSION="LTRIM(RTRIM(RAW))"/>
    </TRANSFORMATION>
    <TRANSFORMATION NAME="OUTPUT" TYPE="Output Transformation">
      <TRANSFORMFIELD NAME="CLEAN" PORTTYPE="INPUT"/>
    </TRANSFORMATION>
    <INSTANCE NAME="INPUT" TYPE="TRANSFORMATION"/>
    <INSTANCE NAME="EXP_TRIM" TYPE="TRANSFORMATION"/>
    <INSTANCE NAME="OUTPUT" TYPE="TRANSFORMATION"/>
    <CONNECTOR FROMINSTANCE="INPUT" FROMFIELD="RAW" TOINSTANCE="EXP_TRIM" TOFIELD="RAW"/>
    <CONNECTOR FROMINSTANCE="EXP_TRIM" FROMFIELD="CLEAN" TOINSTANCE="OUTPUT" TOFIELD="CLEAN"/>
  </MAPPLET>
  <MAPPING NAME="M2">
    <INSTANCE NAME="SRC" TYPE="SOURCE"/>
    <INSTANCE NAME="MPL1" TYPE="MAPPLET" TRANSFORMATION_NAME="MPLT_CLEAN"/>
    <INSTANCE NAME="TGT" TYPE="TARGET"/>
    <CONNECTOR FROMINSTANCE="SRC" FROMFIELD="V" TOINSTANCE="MPL1" TOFIELD="RAW"/>
    <CONNECTOR FROMINSTANCE="MPL1" FROMFIELD="CLEAN" TOINSTANCE="TGT" TOFIELD="V"/>
  </MAPPING>
</FOLDER></REPOSITORY></POWERMART>"#;

const WITH_OVERRIDE: &str = r#"<POWERMART><REPOSITORY><FOLDER NAME="F3">
  <SOURCE NAME="ORDERS" DBDNAME="dw" OWNERNAME="sales"><SOURCEFIELD NAME="ID"/><SOURCEFIELD NAME="AMT"/></SOURCE>
  <TARGET NAME="OUT"><TARGETFIELD NAME="TOTAL"/></TARGET>
  <MAPPING NAME="M3">
    <TRANSFORMATION NAME="SQ_ORDERS" TYPE="Source Qualifier">
      <TRANSFORMFIELD NAME="ID" PORTTYPE="INPUT/OUTPUT"/>
      <TRANSFORMFIELD NAME="TOTAL" PORTTYPE="INPUT/OUTPUT"/>
      <TABLEATTRIBUTE NAME="Sql Query" VALUE="SELECT o.ID, o.AMT + l.TAX AS TOTAL FROM dw.sales.orders o JOIN dw.sales.lines l ON o.ID = l.ORDER_ID"/>
    </TRANSFORMATION>
    <INSTANCE NAME="ORDERS" TYPE="SOURCE"/>
    <INSTANCE NAME="SQ_ORDERS" TYPE="TRANSFORMATION">
      <ASSOCIATED_SOURCE_INSTANCE NAME="ORDERS"/>
    </INSTANCE>
    <INSTANCE NAME="OUT" TYPE="TARGET"/>
    <CONNECTOR FROMINSTANCE="ORDERS" FROMFIELD="ID" TOINSTANCE="SQ_ORDERS" TOFIELD="ID"/>
    <CONNECTOR FROMINSTANCE="SQ_ORDERS" FROMFIELD="TOTAL" TOINSTANCE="OUT" TOFIELD="TOTAL"/>
  </MAPPING>
</FOLDER></REPOSITORY></POWERMART>"#;

fn parser() -> WorkflowParser {
    WorkflowParser::new(Arc::new(Store::in_memory()))
}

fn edges(store: &Store) -> Vec<(String, String)> {
    store
        .load::<Edge>()
        .expect("edges load")
        .into_iter()
        .map(|e| (e.from_port_id, e.to_port_id))
        .collect()
}

/// Every row of every table, in store order.
fn snapshot(store: &Store) -> BTreeMap<Table, Vec<Record>> {
    Table::ALL.iter().map(|t| (*t, store.all_rows(*t))).collect()
}

fn has_edge(store: &Store, from: &str, to: &str) -> bool {
    edges(store).iter().any(|(f, t)| f == from && t == to)
}

#[test]
fn test_parse_builds_namespaced_graph() {
    let p = parser();
    let mid = p.parse_workflow(SIMPLE).expect("should parse");
    assert_eq!(mid, "F1:M1");

    let store = p.store();
    assert!(has_edge(store, "F1:M1:S1:AMT", "F1:M1:EXP1:IN_AMT"));
    assert!(has_edge(store, "F1:M1:EXP1:IN_AMT", "F1:M1:EXP1:AMT"));
    assert!(has_edge(store, "F1:M1:EXP1:AMT", "F1:M1:T1:AMT"));
    assert_eq!(edges(store).len(), 3);

    let objects = store.load::<PhysicalObject>().unwrap();
    let ids: Vec<_> = objects.iter().map(|o| o.object_id.as_str()).collect();
    assert!(ids.contains(&"SRC:STG.RAW.S1"));
    assert!(ids.contains(&"TGT:DW.FIN.T1"));

    let ports = store.load::<Port>().unwrap();
    let src_amt = ports.iter().find(|p| p.port_id == "F1:M1:S1:AMT").unwrap();
    assert_eq!(src_amt.direction, Direction::Output);
    assert_eq!(src_amt.dtype, "decimal");
}

#[test]
fn test_parse_is_idempotent() {
    let p = parser();
    p.parse_workflow(SIMPLE).expect("first parse");
    let first = snapshot(p.store());
    p.parse_workflow(SIMPLE).expect("second parse");
    assert_eq!(snapshot(p.store()), first);

    let ports = p.store().by_id(Table::Ports, "port_id");
    assert_eq!(ports.len(), p.store().len(Table::Ports));
}

#[test]
fn test_empty_formula_has_no_inferred_inputs() {
    let p = parser();
    p.parse_workflow(SIMPLE).unwrap();
    assert!(!edges(p.store())
        .iter()
        .any(|(_, to)| to == "F1:M1:EXP1:LOADED_AT"));

    let legacy = parser().with_options(ParseOptions {
        infer_all_inputs_when_empty: true,
        ..Default::default()
    });
    legacy.parse_workflow(SIMPLE).unwrap();
    assert!(has_edge(
        legacy.store(),
        "F1:M1:EXP1:IN_AMT",
        "F1:M1:EXP1:LOADED_AT"
    ));
}

#[test]
fn test_mapplet_is_inlined_with_bridges() {
    let p = parser();
    p.parse_workflow(WITH_MAPPLET).expect("should parse");
    let store = p.store();

    assert!(has_edge(store, "F2:M2:SRC:V", "F2:M2:MPL1:RAW"));
    assert!(has_edge(store, "F2:M2:MPL1:RAW", "F2:M2:MPL1.INPUT:RAW"));
    assert!(has_edge(store, "F2:M2:MPL1.INPUT:RAW", "F2:M2:MPL1.EXP_TRIM:RAW"));
    assert!(has_edge(store, "F2:M2:MPL1.EXP_TRIM:RAW", "F2:M2:MPL1.EXP_TRIM:CLEAN"));
    assert!(has_edge(store, "F2:M2:MPL1.EXP_TRIM:CLEAN", "F2:M2:MPL1.OUTPUT:CLEAN"));
    assert!(has_edge(store, "F2:M2:MPL1.OUTPUT:CLEAN", "F2:M2:MPL1:CLEAN"));
    assert!(has_edge(store, "F2:M2:MPL1:CLEAN", "F2:M2:TGT:V"));

    let graphs = p.build_graphs(WITH_MAPPLET).unwrap();
    assert_eq!(graphs[0].report().stats.inlined_mapplets, 1);
}

#[test]
fn test_override_without_parser_keeps_raw_text() {
    let p = parser();
    let graphs = p.build_graphs(WITH_OVERRIDE).unwrap();
    let report = graphs[0].report();
    assert_eq!(report.stats.unparsed_overrides, 1);
    assert_eq!(report.stats.parsed_overrides, 0);

    p.persist(&graphs[0]).unwrap();
    let exprs = p.store().load::<Expression>().unwrap();
    let raw = exprs
        .iter()
        .find(|e| e.port_id == "F3:M3:SQ_ORDERS:__sql_override__")
        .expect("raw override recorded");
    assert_eq!(raw.meta.as_deref(), Some("Sql Query"));
    assert!(raw.raw.starts_with("SELECT o.ID"));
    let assoc: Vec<_> = exprs
        .iter()
        .filter(|e| e.port_id == "F3:M3:SQ_ORDERS:__assoc_source__")
        .collect();
    assert_eq!(assoc.len(), 1);
    assert_eq!(assoc[0].raw, "ORDERS");
    assert_eq!(assoc[0].meta, None);
    assert!(!p
        .store()
        .load::<Instance>()
        .unwrap()
        .iter()
        .any(|i| i.name == "SQ_ORDERS.O"));
}

#[test]
fn test_override_with_sql_parser_adds_pseudo_sources() {
    let p = parser().with_override_parser(Arc::new(SqlOverrideParser::new()));
    p.parse_workflow(WITH_OVERRIDE).expect("should parse");
    let store = p.store();

    let instances = store.load::<Instance>().unwrap();
    let pseudo = instances
        .iter()
        .find(|i| i.name == "SQ_ORDERS.L")
        .expect("pseudo source for joined table");
    assert_eq!(pseudo.kind, InstanceType::Source);

    assert!(has_edge(store, "F3:M3:SQ_ORDERS.O:AMT", "F3:M3:SQ_ORDERS:TOTAL"));
    assert!(has_edge(store, "F3:M3:SQ_ORDERS.L:TAX", "F3:M3:SQ_ORDERS:TOTAL"));
    assert!(has_edge(store, "F3:M3:SQ_ORDERS.O:ID", "F3:M3:SQ_ORDERS:ID"));

    let bindings = store.load::<InstancePhys>().unwrap();
    assert!(bindings
        .iter()
        .any(|b| b.instance_id == "F3:M3:SQ_ORDERS.L" && b.object_id == "SRC:DW.SALES.LINES"));

    let join = store
        .load::<Expression>()
        .unwrap()
        .into_iter()
        .find(|e| e.kind == ExprKind::Join)
        .expect("join predicate recorded");
    assert_eq!(join.port_id, "F3:M3:SQ_ORDERS:__join__");
    assert_eq!(join.raw, "o.ID = l.ORDER_ID");

    let assoc = store.load::<SqAssoc>().unwrap();
    assert_eq!(assoc.len(), 1);
    assert_eq!(assoc[0].source_instance_id, "F3:M3:ORDERS");
}

#[test]
fn test_override_name_matches_win_over_select_position() {
    let xml = r#"<FOLDER NAME="F4"><MAPPING NAME="M4">
      <TRANSFORMATION NAME="SQ_ORD" TYPE="Source Qualifier">
        <TRANSFORMFIELD NAME="ID" PORTTYPE="INPUT/OUTPUT"/>
        <TRANSFORMFIELD NAME="TOTAL" PORTTYPE="INPUT/OUTPUT"/>
        <TABLEATTRIBUTE NAME="Sql Query" VALUE="SELECT o.AMT * 2 AS AMT2, o.ID FROM orders o"/>
      </TRANSFORMATION>
      <INSTANCE NAME="SQ_ORD" TYPE="TRANSFORMATION"/>
    </MAPPING></FOLDER>"#;
    let p = parser().with_override_parser(Arc::new(SqlOverrideParser::new()));
    p.parse_workflow(xml).expect("should parse");
    let store = p.store();

    assert!(has_edge(store, "F4:M4:SQ_ORD.O:ID", "F4:M4:SQ_ORD:ID"));
    assert!(has_edge(store, "F4:M4:SQ_ORD.O:AMT", "F4:M4:SQ_ORD:TOTAL"));
    assert!(!has_edge(store, "F4:M4:SQ_ORD.O:AMT", "F4:M4:SQ_ORD:ID"));
}

#[test]
fn test_report_serializes_flat_counters() {
    let xml = r#"<FOLDER NAME="F"><MAPPING NAME="M">
        <CONNECTOR FROMINSTANCE="GHOST" FROMFIELD="A" TOINSTANCE="EXP" TOFIELD="B"/>
    </MAPPING></FOLDER>"#;
    let graphs = parser().build_graphs(xml).expect("should parse");
    let json = serde_json::to_value(graphs[0].report()).expect("report json");
    assert_eq!(json["mapping_id"], "F:M");
    assert_eq!(json["edges"], 1);
    assert_eq!(json["repaired_ports"], 2);
    assert_eq!(json["placeholder_instances"], 2);
    assert!(json.get("stats").is_none());
}

#[test]
fn test_dangling_connector_is_repaired() {
    let xml = r#"<FOLDER NAME="F"><MAPPING NAME="M">
        <CONNECTOR FROMINSTANCE="GHOST" FROMFIELD="A" TOINSTANCE="EXP" TOFIELD="B"/>
    </MAPPING></FOLDER>"#;
    let p = parser();
    let graphs = p.build_graphs(xml).unwrap();
    let stats = graphs[0].report().stats;
    assert_eq!(stats.placeholder_instances, 2);
    assert_eq!(stats.repaired_ports, 2);

    p.persist(&graphs[0]).unwrap();
    let ports = p.store().load::<Port>().unwrap();
    let a = ports.iter().find(|p| p.port_id == "F:M:GHOST:A").unwrap();
    let b = ports.iter().find(|p| p.port_id == "F:M:EXP:B").unwrap();
    assert_eq!(a.direction, Direction::Output);
    assert_eq!(b.direction, Direction::Input);
    assert!(has_edge(p.store(), "F:M:GHOST:A", "F:M:EXP:B"));
}

#[test]
fn test_structural_errors() {
    let p = parser();
    assert!(matches!(
        p.parse_workflow("<POWERMART/>"),
        Err(ParseError::MissingFolder)
    ));
    assert!(matches!(
        p.parse_workflow(r#"<FOLDER NAME="EMPTY"/>"#),
        Err(ParseError::MissingMapping { .. })
    ));
    assert!(matches!(
        p.parse_workflow(r#"<FOLDER NAME="F"><MAPPING NAME="M"></FOLDER>"#),
        Err(ParseError::Xml(_))
    ));
    assert!(p.store().is_empty());
}

#[test]
fn test_parse_workflow_file_returns_the_first_mapping() {
    let two = r#"<FOLDER NAME="F"><MAPPING NAME="FIRST"/><MAPPING NAME="SECOND"/></FOLDER>"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.xml");
    std::fs::write(&path, two).unwrap();

    let p = parser();
    assert_eq!(p.parse_workflow_file(&path).expect("should parse"), "F:FIRST");
    assert_eq!(
        p.parse_workflow_file_all(&path).expect("should parse"),
        vec!["F:FIRST".to_string(), "F:SECOND".to_string()]
    );
    assert_eq!(p.store().len(Table::Mappings), 2);

    assert!(matches!(
        p.parse_workflow_file(&dir.path().join("absent.xml")),
        Err(ParseError::Io { .. })
    ));
}

#[test]
fn test_batch_skips_bad_files_and_links_workflows() {
    let downstream = r#"<FOLDER NAME="F9"><SOURCE NAME="T1" DBDNAME="dw" OWNERNAME="fin">
        <SOURCEFIELD NAME="AMT"/></SOURCE>
        <MAPPING NAME="M9"><INSTANCE NAME="T1" TYPE="SOURCE"/></MAPPING></FOLDER>"#;

    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("a_upstream.xml");
    let next = dir.path().join("b_downstream.xml");
    let bad = dir.path().join("c_broken.xml");
    std::fs::write(&good, SIMPLE).unwrap();
    std::fs::write(&next, downstream).unwrap();
    std::fs::write(&bad, r#"<FOLDER NAME="F"><MAPPING NAME="M"></FOLDER>"#).unwrap();

    let p = parser();
    let report = load_batch(&p, &[bad.clone(), next.clone(), good.clone()]).unwrap();
    assert_eq!(report.files, 3);
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(report.loaded[0].file, good);
    assert_eq!(report.loaded[0].mapping_ids, vec!["F1:M1".to_string()]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, bad);
    assert_eq!(report.crosslinks, 1);

    let links = p.store().load::<CrossLink>().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].full_name, "DW.FIN.T1");
    assert_eq!(links[0].source_instance_id, "F9:M9:T1");
    assert_eq!(links[0].target_instance_id, "F1:M1:T1");

    let json = serde_json::to_value(&report).expect("batch json");
    assert_eq!(json["files"], 3);
    assert_eq!(json["loaded"][0]["mapping_ids"][0], "F1:M1");
    assert!(json["errors"][0]["error"].is_string());
}
