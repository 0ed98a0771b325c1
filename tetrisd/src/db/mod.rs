//! Mapping database: per-executable catalogue ingestion.
//!
//! The database is a directory of CSV files, one per executable; the file
//! stem names the executable, each data row is one mapping.  The first
//! column is the mapping name.  Columns whose header starts with `t_` assign
//! the named thread to a symbolic CPU (`ARM00`..`ARM07`); every other column
//! is a numeric characteristic:
//!
//! ```csv
//! name,t_worker,t_io,executionTime,energyConsumption
//! M1,ARM04,ARM05,100,30
//! M2,ARM00,ARM01,50,20
//! ```
//!
//! A reload is all-or-nothing: any parse error aborts the load and leaves
//! the database empty (the caller logs and keeps serving registered clients
//! from their own catalogue copies).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::equivalence::config::cpu_index;
use crate::mapping::Mapping;

/// Prefix marking a column as a thread assignment.
const THREAD_COLUMN_PREFIX: &str = "t_";

/// Extension of catalogue files; other directory entries are ignored.
const CATALOGUE_EXTENSION: &str = "csv";

/// All known catalogues, keyed by executable basename.
#[derive(Debug, Default)]
pub struct MappingDatabase {
    dir: PathBuf,
    catalogues: BTreeMap<String, Vec<Mapping>>,
}

impl MappingDatabase {
    /// An empty database reading from `dir`.  Call
    /// [`reload`](Self::reload) to populate it.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MappingDatabase {
            dir: dir.into(),
            catalogues: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The catalogue for `exec`, if one was loaded.
    pub fn catalogue(&self, exec: &str) -> Option<&[Mapping]> {
        self.catalogues.get(exec).map(Vec::as_slice)
    }

    pub fn catalogues(&self) -> &BTreeMap<String, Vec<Mapping>> {
        &self.catalogues
    }

    /// Re-read every catalogue file from the database directory.
    ///
    /// # Errors
    /// Any I/O or parse error aborts the whole load; the database is left
    /// empty in that case.
    pub fn reload(&mut self) -> Result<()> {
        info!(dir = %self.dir.display(), "updating mapping database");
        self.catalogues.clear();

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("cannot read mapping directory {}", self.dir.display()))?;

        let mut catalogues = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(CATALOGUE_EXTENSION)
            {
                continue;
            }

            let Some(exec) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let exec = exec.trim().to_string();

            info!(exec = %exec, file = %path.display(), "found mapping catalogue");
            let mappings = parse_catalogue(&path)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            catalogues.insert(exec, mappings);
        }

        self.catalogues = catalogues;
        Ok(())
    }
}

/// Parse one catalogue file into its mappings, in row order.
fn parse_catalogue(path: &Path) -> Result<Vec<Mapping>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        bail!("missing header row");
    }

    let mut mappings = Vec::new();
    for record in reader.records() {
        let record = record?;

        let name = record
            .get(0)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            bail!("row {} has no mapping name", mappings.len() + 1);
        }

        let mut threads = Vec::new();
        let mut characteristics = Vec::new();

        // Column 0 is the mapping name; classify the rest by header.
        for (column, value) in headers.iter().zip(record.iter()).skip(1) {
            if let Some(thread) = column.strip_prefix(THREAD_COLUMN_PREFIX) {
                let cpu = cpu_index(value).with_context(|| {
                    format!("mapping '{name}': unknown CPU name '{value}'")
                })?;
                threads.push((thread.to_string(), cpu));
            } else {
                let value: f64 = value.parse().with_context(|| {
                    format!("mapping '{name}': characteristic '{column}' is not a number")
                })?;
                characteristics.push((column.to_string(), value));
            }
        }

        mappings.push(Mapping::new(name, threads, characteristics));
    }

    if mappings.is_empty() {
        bail!("catalogue contains no mappings");
    }

    debug!(
        file = %path.display(),
        mappings = mappings.len(),
        "parsed catalogue"
    );

    Ok(mappings)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
