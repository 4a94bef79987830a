//! Lineage Engine
//!
//! Answers "where does this column come from?" over the graph stored by the
//! workflow ingest:
//!
//! - [`LineageEngine::find_target_candidates`]: sink ports named like the
//!   queried field
//! - [`LineageEngine::upstream_lineage`]: one backward chain per candidate,
//!   stitched across mappings through shared physical tables
//!
//! Every query works on a [`Snapshot`] taken at its start, so queries are
//! read-only and independent of each other.

pub mod matcher;
pub mod snapshot;
pub mod traverse;

pub use matcher::{best_match, best_match_with, similarity, MATCH_THRESHOLD};
pub use snapshot::Snapshot;
pub use traverse::is_bare_identifier;

use lineage_model::{LineageRow, TargetCandidate};
use lineage_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LineageError>;

// ============================================================================
// Options
// ============================================================================

/// How an upstream Source is matched to Targets of other mappings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CrossWorkflowPolicy {
    /// Stitch only when exactly one other mapping has a Target bound to the
    /// same full name with an INPUT port of exactly the same column name.
    #[default]
    StrictUnique,
    /// Stitch to every other mapping whose bound Target has an INPUT port
    /// whose name scores at least `threshold` with the Name Matcher.
    FuzzyAll { threshold: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageOptions {
    pub max_rows: usize,
    pub cross_workflow: CrossWorkflowPolicy,
}

impl Default for LineageOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            cross_workflow: CrossWorkflowPolicy::StrictUnique,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Clone)]
pub struct LineageEngine {
    store: Arc<Store>,
    options: LineageOptions,
}

impl LineageEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            options: LineageOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LineageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LineageOptions {
        &self.options
    }

    /// Sink ports whose name equals the field (qualifier stripped,
    /// case-insensitive), in chain order.
    pub fn find_target_candidates(&self, field: &str) -> Result<Vec<TargetCandidate>> {
        let snap = Snapshot::load(&self.store)?;
        Ok(traverse::target_candidates(&snap, field))
    }

    /// Ordered upstream lineage rows for `field`, at most `max_rows` in total.
    ///
    /// An unknown field yields no rows.
    pub fn upstream_lineage(&self, field: &str, max_rows: usize) -> Result<Vec<LineageRow>> {
        let snap = Snapshot::load(&self.store)?;
        let rows = traverse::upstream_lineage(&snap, field, max_rows, self.options.cross_workflow);
        tracing::info!(
            field,
            rows = rows.len(),
            chains = rows.last().map(|r| r.chain_id).unwrap_or(0),
            "lineage query"
        );
        Ok(rows)
    }

    /// [`upstream_lineage`](Self::upstream_lineage) with the configured row
    /// budget.
    pub fn lineage(&self, field: &str) -> Result<Vec<LineageRow>> {
        self.upstream_lineage(field, self.options.max_rows)
    }
}
