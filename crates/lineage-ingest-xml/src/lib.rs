//! Workflow Export Ingest
//!
//! Turns an exported mapping workflow (XML) into the port-level lineage
//! graph and persists it to a [`Store`]:
//!
//! 1. `xml`: fold the document into an element tree
//! 2. `decl`: read folders, definitions, mappings, mapplets
//! 3. `builder` / `mapplet` / `overrides`: build a pure [`MappingGraph`]
//! 4. [`WorkflowParser::persist`]: idempotent writes to the store
//!
//! Batches of files are parsed in parallel and persisted in file order
//! (`batch`), after which the cross-workflow link catalog is rebuilt
//! (`links`).

pub mod attrs;
pub mod batch;
pub mod builder;
pub mod decl;
pub mod expr;
pub mod graph;
pub mod links;
pub mod mapplet;
pub mod overrides;
pub mod xml;

pub use batch::{load_batch, reload_batch, BatchReport, FileError, FileLoaded};
pub use graph::{BuildStats, GraphFragment, MappingGraph, ParseReport};
pub use links::materialize_crosslinks;
pub use xml::XmlError;

use lineage_model::QueryOverrideParser;
use lineage_store::{Store, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("no FOLDER element in document")]
    MissingFolder,
    #[error("no MAPPING element in folder {folder}")]
    MissingMapping { folder: String },
    #[error("{element} element is missing required attribute {attribute}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Legacy wiring: an OUTPUT port with an empty formula is fed by every
    /// input and variable port of its transformation. Off by default, since
    /// it manufactures dependencies the export never states.
    pub infer_all_inputs_when_empty: bool,
    /// Nesting limit for mapplet inlining; deeper mapplets stay opaque.
    pub max_mapplet_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            infer_all_inputs_when_empty: false,
            max_mapplet_depth: 16,
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parses workflow exports into a shared store.
///
/// Cheap to clone; clones share the store and override parser.
#[derive(Clone)]
pub struct WorkflowParser {
    store: Arc<Store>,
    options: ParseOptions,
    overrides: Option<Arc<dyn QueryOverrideParser>>,
}

impl WorkflowParser {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            options: ParseOptions::default(),
            overrides: None,
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable structured handling of embedded SQL overrides.
    pub fn with_override_parser(mut self, parser: Arc<dyn QueryOverrideParser>) -> Self {
        self.overrides = Some(parser);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Build the graphs of every mapping in the document without touching
    /// the store.
    pub fn build_graphs(&self, xml_text: &str) -> Result<Vec<MappingGraph>, ParseError> {
        let doc = xml::parse_document(xml_text)?;
        let folders = decl::read_folders(&doc)?;
        let parser = self.overrides.as_deref();

        let mut graphs = Vec::new();
        for folder in &folders {
            for mapping in &folder.mappings {
                graphs.push(builder::build_mapping(folder, mapping, &self.options, parser));
            }
        }
        Ok(graphs)
    }

    /// Write one graph. Re-persisting the same graph adds no rows.
    pub fn persist(&self, graph: &MappingGraph) -> Result<ParseReport, ParseError> {
        let g = &graph.graph;
        self.store
            .upsert_rows(std::slice::from_ref(&graph.mapping))?;
        self.store.insert_rows(&g.instances)?;
        self.store.insert_rows(&g.ports)?;
        self.store.insert_rows(&g.edges)?;
        self.store.insert_rows(&g.expressions)?;
        self.store.insert_rows(&g.physical_objects)?;
        self.store.insert_rows(&g.map_sources)?;
        self.store.insert_rows(&g.map_targets)?;
        self.store.insert_rows(&g.instance_phys)?;
        self.store.insert_rows(&g.sq_assoc)?;

        let report = graph.report();
        tracing::info!(
            mapping = %report.mapping_id,
            instances = report.instances,
            ports = report.ports,
            edges = report.edges,
            inferred_edges = report.stats.inferred_edges,
            repaired_ports = report.stats.repaired_ports,
            inlined_mapplets = report.stats.inlined_mapplets,
            "mapping persisted"
        );
        Ok(report)
    }

    /// Parse and persist every mapping; returns their ids in document order.
    pub fn parse_workflow_all(&self, xml_text: &str) -> Result<Vec<String>, ParseError> {
        let graphs = self.build_graphs(xml_text)?;
        let mut ids = Vec::with_capacity(graphs.len());
        for graph in &graphs {
            ids.push(self.persist(graph)?.mapping_id);
        }
        Ok(ids)
    }

    /// Parse and persist a workflow; returns the first mapping's id.
    pub fn parse_workflow(&self, xml_text: &str) -> Result<String, ParseError> {
        let ids = self.parse_workflow_all(xml_text)?;
        // `read_folders` guarantees at least one mapping.
        ids.into_iter().next().ok_or(ParseError::MissingFolder)
    }

    /// [`Self::parse_workflow`] over a file on disk.
    pub fn parse_workflow_file(&self, path: &Path) -> Result<String, ParseError> {
        let text = read_file(path)?;
        self.parse_workflow(&text)
    }

    pub fn parse_workflow_file_all(&self, path: &Path) -> Result<Vec<String>, ParseError> {
        let text = read_file(path)?;
        self.parse_workflow_all(&text)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // Exports declare windows-1252 but are ASCII in practice.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
