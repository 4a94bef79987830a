//! Batch loading of many workflow files.
//!
//! Files are read and built in parallel (graph building never touches the
//! store), then persisted one file at a time in path order so the store's
//! row order does not depend on thread scheduling. A file that fails to
//! parse is reported and skipped; the rest of the batch still loads.

use crate::{links, read_file, MappingGraph, ParseError, WorkflowParser};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct FileLoaded {
    pub file: PathBuf,
    pub mapping_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: usize,
    pub loaded: Vec<FileLoaded>,
    pub errors: Vec<FileError>,
    pub crosslinks: usize,
}

impl BatchReport {
    pub fn mapping_count(&self) -> usize {
        self.loaded.iter().map(|l| l.mapping_ids.len()).sum()
    }
}

fn build_file(parser: &WorkflowParser, path: &Path) -> Result<Vec<MappingGraph>, ParseError> {
    let text = read_file(path)?;
    parser.build_graphs(&text)
}

/// Parse and persist every file, then rebuild the cross-workflow link table.
///
/// Store failures abort the batch; per-file parse failures do not.
pub fn load_batch(parser: &WorkflowParser, paths: &[PathBuf]) -> Result<BatchReport, ParseError> {
    let mut paths = paths.to_vec();
    paths.sort();
    paths.dedup();

    let built: Vec<(PathBuf, Result<Vec<MappingGraph>, ParseError>)> = paths
        .par_iter()
        .map(|p| (p.clone(), build_file(parser, p)))
        .collect();

    let mut report = BatchReport {
        files: built.len(),
        ..Default::default()
    };
    for (file, result) in built {
        match result {
            Ok(graphs) => {
                let mut mapping_ids = Vec::with_capacity(graphs.len());
                for graph in &graphs {
                    mapping_ids.push(parser.persist(graph)?.mapping_id);
                }
                report.loaded.push(FileLoaded { file, mapping_ids });
            }
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "workflow file skipped");
                report.errors.push(FileError {
                    file,
                    error: err.to_string(),
                });
            }
        }
    }

    report.crosslinks = links::materialize_crosslinks(parser.store())?;
    tracing::info!(
        files = report.files,
        mappings = report.mapping_count(),
        errors = report.errors.len(),
        crosslinks = report.crosslinks,
        "batch loaded"
    );
    Ok(report)
}

/// Clear the store, then load the batch.
pub fn reload_batch(parser: &WorkflowParser, paths: &[PathBuf]) -> Result<BatchReport, ParseError> {
    parser.store().reset_all()?;
    load_batch(parser, paths)
}
