//! Lineage CLI
//!
//! Loads workflow export XML into a Record Store and answers column lineage
//! questions against it:
//! - `load`: parse every `*.xml` under a directory (batch, parallel parse)
//! - `lookup`: upstream lineage chains for a field
//! - `targets`: the sink ports a lookup would start from
//! - `links`: physical tables shared between workflows
//! - `stats` / `reset`: store housekeeping

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use lineage_engine::{CrossWorkflowPolicy, LineageEngine, LineageOptions, MATCH_THRESHOLD};
use lineage_ingest_sql::SqlOverrideParser;
use lineage_ingest_xml::{load_batch, reload_batch, BatchReport, ParseOptions, WorkflowParser};
use lineage_model::{CrossLink, Table};
use lineage_store::{Store, StoreConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod render;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(author, version, about = "Column-level lineage for ETL workflow exports")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Directory holding the Record Store table files
    #[arg(long, global = true, env = "LINEAGE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every workflow XML file under a directory into the store
    Load {
        /// Directory to scan recursively for `*.xml`
        #[arg(env = "MAPPINGS_DIR", default_value = "./samples")]
        dir: PathBuf,
        /// Clear the store before loading
        #[arg(long)]
        replace: bool,
        /// Wire every input into transformation outputs that have no formula
        #[arg(long)]
        infer_all_inputs: bool,
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upstream lineage of a field (e.g. `AMT` or `DW.FIN.AMT`)
    Lookup {
        field: String,
        /// Stop after this many rows across all chains
        #[arg(long, default_value_t = lineage_engine::DEFAULT_MAX_ROWS)]
        max_rows: usize,
        /// Stitch workflows on similar column names, not only identical ones
        #[arg(long)]
        fuzzy: bool,
        /// Minimum similarity for `--fuzzy`
        #[arg(long, default_value_t = MATCH_THRESHOLD, requires = "fuzzy")]
        threshold: f64,
        #[arg(long)]
        json: bool,
    },

    /// Ports a lookup of the field would start from
    Targets {
        field: String,
        #[arg(long)]
        json: bool,
    },

    /// Tables written by one workflow and read by another
    Links {
        /// Only links through this table (exact `DB.SCHEMA.NAME`)
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Row counts per table
    Stats,

    /// Delete every row in the store
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let store = open_store(&cli.global.data_dir)?;
    match cli.command {
        Commands::Load {
            dir,
            replace,
            infer_all_inputs,
            json,
        } => cmd_load(store, &dir, replace, infer_all_inputs, json),
        Commands::Lookup {
            field,
            max_rows,
            fuzzy,
            threshold,
            json,
        } => cmd_lookup(store, &field, max_rows, fuzzy, threshold, json),
        Commands::Targets { field, json } => cmd_targets(store, &field, json),
        Commands::Links { full_name, json } => cmd_links(&store, full_name.as_deref(), json),
        Commands::Stats => {
            render::print_counts(&store.table_counts());
            Ok(())
        }
        Commands::Reset => {
            store.reset_all()?;
            println!(
                "{} {}",
                "cleared".green().bold(),
                cli.global.data_dir.display()
            );
            Ok(())
        }
    }
}

/// `RUST_LOG` wins when set; otherwise warnings plus `-v` steps.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(data_dir: &Path) -> Result<Arc<Store>> {
    let store = Store::open(StoreConfig::persistent(data_dir))
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Every `*.xml` file under `dir` (extension case-insensitive), sorted.
fn collect_xml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("scanning {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_xml = entry
            .path()
            .extension()
            .map(|e| e.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        if is_xml {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn cmd_load(store: Arc<Store>, dir: &Path, replace: bool, infer_all_inputs: bool, json: bool) -> Result<()> {
    let files = collect_xml_files(dir)?;
    let options = ParseOptions {
        infer_all_inputs_when_empty: infer_all_inputs,
        ..Default::default()
    };
    let parser = WorkflowParser::new(store)
        .with_options(options)
        .with_override_parser(Arc::new(SqlOverrideParser::new()));

    if !json {
        println!(
            "{} {} file(s) from {}",
            "Loading".green().bold(),
            files.len(),
            dir.display()
        );
    }
    let report = if replace {
        reload_batch(&parser, &files)?
    } else {
        load_batch(&parser, &files)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_batch(&report);
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    for loaded in &report.loaded {
        println!(
            "  {} {} ({} mapping(s))",
            "→".cyan(),
            loaded.file.display(),
            loaded.mapping_ids.len()
        );
    }
    for failed in &report.errors {
        println!(
            "  {} {}: {}",
            "error".red().bold(),
            failed.file.display(),
            failed.error
        );
    }
    println!(
        "{} {} mapping(s) from {} file(s), {} failed, {} cross-workflow link(s)",
        "ok".green().bold(),
        report.mapping_count(),
        report.loaded.len(),
        report.errors.len(),
        report.crosslinks
    );
}

fn cmd_lookup(
    store: Arc<Store>,
    field: &str,
    max_rows: usize,
    fuzzy: bool,
    threshold: f64,
    json: bool,
) -> Result<()> {
    let cross_workflow = if fuzzy {
        CrossWorkflowPolicy::FuzzyAll { threshold }
    } else {
        CrossWorkflowPolicy::StrictUnique
    };
    let engine = LineageEngine::new(store).with_options(LineageOptions {
        max_rows,
        cross_workflow,
    });
    let rows = engine.lineage(field)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("{} no lineage found for {}", "info:".yellow().bold(), field.bold());
    } else {
        render::print_lineage(&rows);
    }
    Ok(())
}

fn cmd_targets(store: Arc<Store>, field: &str, json: bool) -> Result<()> {
    let candidates = LineageEngine::new(store).find_target_candidates(field)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else if candidates.is_empty() {
        println!("{} no sink ports named {}", "info:".yellow().bold(), field.bold());
    } else {
        render::print_candidates(&candidates);
    }
    Ok(())
}

fn cmd_links(store: &Store, full_name: Option<&str>, json: bool) -> Result<()> {
    let links = select_links(store, full_name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&links)?);
    } else {
        render::print_links(&links, &mapping_names(store));
    }
    Ok(())
}

fn select_links(store: &Store, full_name: Option<&str>) -> Result<Vec<CrossLink>> {
    let Some(name) = full_name else {
        return Ok(store.load()?);
    };
    store
        .where_eq(Table::Crosslinks, &[("full_name", Value::String(name.to_string()))])
        .into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).context("decoding crosslink row"))
        .collect()
}

/// mapping_id -> mapping name.
fn mapping_names(store: &Store) -> BTreeMap<String, String> {
    store
        .by_id(Table::Mappings, "mapping_id")
        .into_iter()
        .filter_map(|(id, row)| Some((id, row.get("name")?.as_str()?.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lookup_flags_parse() {
        let cli = Cli::try_parse_from([
            "lineage", "--data-dir", "/tmp/d", "lookup", "AMT", "--fuzzy", "--threshold", "0.9",
        ])
        .expect("should parse");
        assert_eq!(cli.global.data_dir, PathBuf::from("/tmp/d"));
        match cli.command {
            Commands::Lookup {
                field,
                fuzzy,
                threshold,
                max_rows,
                ..
            } => {
                assert_eq!(field, "AMT");
                assert!(fuzzy);
                assert_eq!(threshold, 0.9);
                assert_eq!(max_rows, lineage_engine::DEFAULT_MAX_ROWS);
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn threshold_requires_fuzzy() {
        assert!(Cli::try_parse_from(["lineage", "lookup", "AMT", "--threshold", "0.5"]).is_err());
    }

    #[test]
    fn xml_files_are_found_recursively_and_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("b/nested")).expect("mkdir");
        fs::write(dir.path().join("b/nested/two.XML"), "<x/>").expect("write");
        fs::write(dir.path().join("a.xml"), "<x/>").expect("write");
        fs::write(dir.path().join("notes.txt"), "").expect("write");

        let files = collect_xml_files(dir.path()).expect("scan");
        assert_eq!(
            files,
            vec![dir.path().join("a.xml"), dir.path().join("b/nested/two.XML")]
        );
    }

    fn linked_store() -> Store {
        let store = Store::in_memory();
        let link = |full: &str, reader: &str| CrossLink {
            full_name: full.into(),
            source_mapping_id: format!("F2:{reader}"),
            source_instance_id: format!("F2:{reader}:SRC"),
            target_mapping_id: "F1:LOAD".into(),
            target_instance_id: "F1:LOAD:TGT".into(),
        };
        store
            .upsert_rows(&[link("DW.FIN.ORDERS", "READ_A"), link("DW.FIN.LINES", "READ_B")])
            .expect("crosslinks");
        store
            .upsert_rows(&[lineage_model::Mapping {
                mapping_id: "F1:LOAD".into(),
                name: "LOAD".into(),
                folder: "F1".into(),
            }])
            .expect("mappings");
        store
    }

    #[test]
    fn links_filter_on_the_exact_full_name() {
        let store = linked_store();
        assert_eq!(select_links(&store, None).expect("all").len(), 2);

        let hits = select_links(&store, Some("DW.FIN.LINES")).expect("filtered");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_instance_id, "F2:READ_B:SRC");
        assert!(select_links(&store, Some("dw.fin.lines")).expect("filtered").is_empty());
    }

    #[test]
    fn mapping_names_are_indexed_by_id() {
        let names = mapping_names(&linked_store());
        assert_eq!(names.get("F1:LOAD").map(String::as_str), Some("LOAD"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(collect_xml_files(&dir.path().join("absent")).is_err());
    }
}
