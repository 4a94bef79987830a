//! Lineage Record Store
//!
//! A table-oriented store with two write primitives:
//!
//! - `upsert`: merge-on-key (later fields overwrite earlier ones)
//! - `insert_if_missing`: dedup-on-key, existing rows are never touched
//!
//! Each table sits behind its own `RwLock`, so writes are atomic per table
//! and independent parsers can persist concurrently. When a data directory is
//! configured, each table is mirrored to `<dir>/<table>.json` after every
//! write and reloaded on `open`.
//!
//! The store is an explicit handle: create it once, share it by `Arc`, and
//! clear it only through `reset_all`.

use lineage_model::{Table, TableRow};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};


/// A single row as stored: a flat JSON object.
pub type Record = Map<String, Value>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in table {table}: {source}")]
    Json {
        table: Table,
        #[source]
        source: serde_json::Error,
    },
    #[error("row for table {0} does not serialize to a JSON object")]
    NotAnObject(Table),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
pub struct StoreConfig {
    /// Directory for `<table>.json` files; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Pretty-print table files.
    pub pretty: bool,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            pretty: false,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct Store {
    config: StoreConfig,
    tables: BTreeMap<Table, RwLock<Vec<Record>>>,
}

impl Store {
    /// Open a store, loading any table files already present.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for table in Table::ALL {
            let rows = match &config.data_dir {
                Some(dir) => load_table_file(dir, table)?,
                None => Vec::new(),
            };
            tables.insert(table, RwLock::new(rows));
        }
        Ok(Self { config, tables })
    }

    pub fn in_memory() -> Self {
        let tables = Table::ALL
            .iter()
            .map(|t| (*t, RwLock::new(Vec::new())))
            .collect();
        Self {
            config: StoreConfig::in_memory(),
            tables,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn table(&self, table: Table) -> &RwLock<Vec<Record>> {
        // Every `Table` variant is inserted by both constructors.
        &self.tables[&table]
    }

    /// Clear every table (and rewrite empty table files).
    pub fn reset_all(&self) -> Result<()> {
        if let Some(dir) = &self.config.data_dir {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        for table in Table::ALL {
            let mut rows = self.table(table).write();
            rows.clear();
            self.save(table, &rows)?;
        }
        tracing::debug!("record store reset");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn all_rows(&self, table: Table) -> Vec<Record> {
        self.table(table).read().clone()
    }

    pub fn len(&self, table: Table) -> usize {
        self.table(table).read().len()
    }

    pub fn is_empty(&self) -> bool {
        Table::ALL.iter().all(|t| self.len(*t) == 0)
    }

    pub fn table_counts(&self) -> BTreeMap<Table, usize> {
        Table::ALL.iter().map(|t| (*t, self.len(*t))).collect()
    }

    /// Index a table by one field; on duplicate keys the last row wins.
    pub fn by_id(&self, table: Table, key_field: &str) -> BTreeMap<String, Record> {
        let rows = self.table(table).read();
        let mut out = BTreeMap::new();
        for row in rows.iter() {
            if let Some(v) = row.get(key_field) {
                out.insert(value_key(v), row.clone());
            }
        }
        out
    }

    /// Rows whose fields equal every `(field, value)` filter.
    pub fn where_eq(&self, table: Table, filters: &[(&str, Value)]) -> Vec<Record> {
        self.table(table)
            .read()
            .iter()
            .filter(|row| filters.iter().all(|(k, v)| row.get(*k) == Some(v)))
            .cloned()
            .collect()
    }

    /// Deserialize a whole table into its row type.
    pub fn load<T: TableRow>(&self) -> Result<Vec<T>> {
        let rows = self.table(T::TABLE).read();
        rows.iter()
            .map(|r| {
                serde_json::from_value(Value::Object(r.clone())).map_err(|source| {
                    StoreError::Json {
                        table: T::TABLE,
                        source,
                    }
                })
            })
            .collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Merge-on-key. Returns the number of newly appended rows.
    pub fn upsert(&self, table: Table, records: Vec<Record>, key_fields: &[&str]) -> Result<usize> {
        let mut rows = self.table(table).write();
        let mut index: BTreeMap<String, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (row_key(r, key_fields), i))
            .collect();

        let mut added = 0usize;
        for record in records {
            let key = row_key(&record, key_fields);
            match index.get(&key) {
                Some(&i) => {
                    for (k, v) in record {
                        rows[i].insert(k, v);
                    }
                }
                None => {
                    index.insert(key, rows.len());
                    rows.push(record);
                    added += 1;
                }
            }
        }
        self.save(table, &rows)?;
        Ok(added)
    }

    /// Dedup-on-key. Returns the number of newly appended rows.
    pub fn insert_if_missing(
        &self,
        table: Table,
        records: Vec<Record>,
        key_fields: &[&str],
    ) -> Result<usize> {
        let mut rows = self.table(table).write();
        let mut seen: std::collections::BTreeSet<String> =
            rows.iter().map(|r| row_key(r, key_fields)).collect();

        let mut added = 0usize;
        for record in records {
            if seen.insert(row_key(&record, key_fields)) {
                rows.push(record);
                added += 1;
            }
        }
        if added > 0 {
            self.save(table, &rows)?;
        }
        Ok(added)
    }

    pub fn upsert_rows<T: TableRow>(&self, rows: &[T]) -> Result<usize> {
        self.upsert(T::TABLE, to_records(rows)?, T::KEY)
    }

    pub fn insert_rows<T: TableRow>(&self, rows: &[T]) -> Result<usize> {
        self.insert_if_missing(T::TABLE, to_records(rows)?, T::KEY)
    }

    fn save(&self, table: Table, rows: &[Record]) -> Result<()> {
        let Some(dir) = &self.config.data_dir else {
            return Ok(());
        };
        let path = table_path(dir, table);
        let json = if self.config.pretty {
            serde_json::to_string_pretty(rows)
        } else {
            serde_json::to_string(rows)
        }
        .map_err(|source| StoreError::Json { table, source })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io { path, source })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn to_records<T: TableRow>(rows: &[T]) -> Result<Vec<Record>> {
    rows.iter()
        .map(|row| match serde_json::to_value(row) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::NotAnObject(T::TABLE)),
            Err(source) => Err(StoreError::Json {
                table: T::TABLE,
                source,
            }),
        })
        .collect()
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_key(row: &Record, key_fields: &[&str]) -> String {
    let mut key = String::new();
    for (i, field) in key_fields.iter().enumerate() {
        if i > 0 {
            key.push('\u{1f}');
        }
        match row.get(*field) {
            Some(v) => key.push_str(&value_key(v)),
            None => key.push_str("\u{0}"),
        }
    }
    key
}

fn table_path(dir: &Path, table: Table) -> PathBuf {
    dir.join(format!("{}.json", table.as_str()))
}

fn load_table_file(dir: &Path, table: Table) -> Result<Vec<Record>> {
    let path = table_path(dir, table);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;
    match serde_json::from_str::<Vec<Record>>(&text) {
        Ok(rows) => Ok(rows),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "unreadable table file, starting empty"
            );
            Ok(Vec::new())
        }
    }
}
