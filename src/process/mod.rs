// src/process/mod.rs
//! Shape normalization: raw fetched records → canonical typed tables.

pub mod enrollment;
pub mod geo;
pub mod penetration;
pub mod ratebook;
pub mod states;
pub mod utils;

use arrow::{array::ArrayRef, record_batch::RecordBatch};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    hash::Hash,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{DashboardError, Result};
use crate::fetch::RawDataset;
use crate::schema::{build_record_batch, ColumnSpec, DatasetKind, Period};
use utils::{clean_str, header_key, parse_numeric, Numeric};

pub use enrollment::{EnrollmentRecord, EnrollmentTable};
pub use geo::{Feature, GeoShapes};
pub use penetration::{PenetrationRecord, PenetrationTable};
pub use ratebook::{RatebookRecord, RatebookTable};

/// How many leading records may precede the header row (titles, notes, blank lines).
const HEADER_SCAN_LIMIT: usize = 25;

/// Why a data row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    MissingKey(&'static str),
    MissingValue(&'static str),
    Suppressed(&'static str),
    Negative(&'static str),
    Unparseable(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingKey(c) => write!(f, "missing key {}", c),
            Rejection::MissingValue(c) => write!(f, "missing {}", c),
            Rejection::Suppressed(c) => write!(f, "suppressed {}", c),
            Rejection::Negative(c) => write!(f, "negative {}", c),
            Rejection::Unparseable(c) => write!(f, "unparseable {}", c),
        }
    }
}

/// A row type with a fixed canonical schema.
pub trait CanonicalRow: Sized {
    const KIND: DatasetKind;
    /// Identity used for collision handling: a later row with the same key replaces the earlier.
    type Key: Eq + Hash + Clone + fmt::Debug;

    /// Canonical columns in output order.
    fn columns() -> &'static [ColumnSpec];
    fn from_fields(fields: &Fields<'_>, period: Period) -> std::result::Result<Self, Rejection>;
    fn key(&self) -> Self::Key;
    /// Column arrays matching `columns()`.
    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef>;
}

/// One data record viewed through the located header.
pub struct Fields<'a> {
    columns: &'a HashMap<&'static str, usize>,
    record: &'a [String],
}

impl<'a> Fields<'a> {
    pub fn new(columns: &'a HashMap<&'static str, usize>, record: &'a [String]) -> Self {
        Self { columns, record }
    }

    /// Cleaned cell for canonical column `name`; empty cells read as `None`.
    pub fn text(&self, name: &str) -> Option<String> {
        let idx = *self.columns.get(name)?;
        let cleaned = clean_str(self.record.get(idx)?);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    pub fn key(&self, name: &'static str) -> std::result::Result<String, Rejection> {
        self.text(name).ok_or(Rejection::MissingKey(name))
    }

    /// Non-negative number; empty, masked or malformed cells reject the row.
    pub fn amount(&self, name: &'static str) -> std::result::Result<f64, Rejection> {
        match self.numeric(name) {
            Numeric::Value(v) if v < 0.0 => Err(Rejection::Negative(name)),
            Numeric::Value(v) => Ok(v),
            Numeric::Missing => Err(Rejection::MissingValue(name)),
            Numeric::Suppressed => Err(Rejection::Suppressed(name)),
            Numeric::Invalid => Err(Rejection::Unparseable(name)),
        }
    }

    /// Non-negative number; empty or masked cells read as `None`.
    pub fn optional_amount(
        &self,
        name: &'static str,
    ) -> std::result::Result<Option<f64>, Rejection> {
        match self.numeric(name) {
            Numeric::Value(v) if v < 0.0 => Err(Rejection::Negative(name)),
            Numeric::Value(v) => Ok(Some(v)),
            Numeric::Missing | Numeric::Suppressed => Ok(None),
            Numeric::Invalid => Err(Rejection::Unparseable(name)),
        }
    }

    pub fn count(&self, name: &'static str) -> std::result::Result<u64, Rejection> {
        self.amount(name).map(|v| v.round() as u64)
    }

    pub fn optional_count(
        &self,
        name: &'static str,
    ) -> std::result::Result<Option<u64>, Rejection> {
        self.optional_amount(name).map(|v| v.map(|v| v.round() as u64))
    }

    fn numeric(&self, name: &str) -> Numeric {
        match self.columns.get(name).and_then(|&idx| self.record.get(idx)) {
            Some(cell) => parse_numeric(cell),
            None => Numeric::Missing,
        }
    }
}

/// Diagnostics for one normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    /// Records after the header row, across all inputs.
    pub records_read: usize,
    pub rows_kept: usize,
    pub empty_rows: usize,
    /// Dropped rows by reason, e.g. `missing key state`.
    pub rejected: BTreeMap<String, usize>,
    /// Rows replaced by a later row with the same key.
    pub replaced: usize,
}

impl NormalizeReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Every record that did not become a row of its own.
    pub fn dropped(&self) -> usize {
        self.empty_rows + self.rejected_total()
    }

    fn reject(&mut self, why: Rejection) {
        *self.rejected.entry(why.to_string()).or_default() += 1;
    }
}

/// A table with the canonical schema of `R`.
#[derive(Debug, Clone)]
pub struct NormalizedTable<R: CanonicalRow> {
    rows: Vec<R>,
    index: HashMap<R::Key, usize>,
    report: NormalizeReport,
}

impl<R: CanonicalRow> Default for NormalizedTable<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            report: NormalizeReport::default(),
        }
    }
}

impl<R: CanonicalRow> NormalizedTable<R> {
    /// Build directly from typed rows, applying the same collision rule as `normalize`.
    pub fn from_rows(rows: impl IntoIterator<Item = R>) -> Self {
        let mut table = Self::default();
        for row in rows {
            table.report.records_read += 1;
            table.insert(row);
        }
        table
    }

    /// Later rows win; the surviving row keeps the first row's position.
    fn insert(&mut self, row: R) {
        match self.index.get(&row.key()) {
            Some(&pos) => {
                self.rows[pos] = row;
                self.report.replaced += 1;
            }
            None => {
                self.index.insert(row.key(), self.rows.len());
                self.rows.push(row);
                self.report.rows_kept += 1;
            }
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn report(&self) -> &NormalizeReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        build_record_batch(R::columns(), R::to_arrays(&self.rows))
    }
}

/// Locate the header row and map canonical column names to record positions.
fn locate_header<R: CanonicalRow>(
    records: &[Vec<String>],
) -> std::result::Result<(usize, HashMap<&'static str, usize>), String> {
    let sourced: Vec<&ColumnSpec> = R::columns().iter().filter(|c| c.is_sourced()).collect();
    let mut best: Option<(usize, Vec<&'static str>)> = None;

    for (row_idx, record) in records.iter().take(HEADER_SCAN_LIMIT).enumerate() {
        let keys: Vec<String> = record.iter().map(|h| header_key(h)).collect();
        let mut columns = HashMap::new();
        for col in &sourced {
            // aliases are in preference order
            let pos = col.aliases.iter().find_map(|alias| {
                let wanted = header_key(alias);
                keys.iter().position(|k| *k == wanted)
            });
            if let Some(pos) = pos {
                columns.insert(col.name, pos);
            }
        }

        let missing: Vec<&'static str> = sourced
            .iter()
            .filter(|c| c.required && !columns.contains_key(c.name))
            .map(|c| c.name)
            .collect();
        if missing.is_empty() {
            return Ok((row_idx, columns));
        }
        if best.as_ref().map_or(true, |(_, m)| missing.len() < m.len()) {
            best = Some((row_idx, missing));
        }
    }

    let missing = best
        .map(|(_, m)| m)
        .unwrap_or_else(|| sourced.iter().filter(|c| c.required).map(|c| c.name).collect());
    Err(format!("no header row with columns {}", missing.join(", ")))
}

/// Normalize one or more raw datasets of the same kind into a single canonical table.
///
/// Inputs are concatenated in order. Fully empty rows and rows failing validation
/// are dropped and counted in the table's `NormalizeReport`.
#[instrument(level = "info", skip(raw), fields(kind = %R::KIND, inputs = raw.len()))]
pub fn normalize<R: CanonicalRow>(raw: &[RawDataset]) -> Result<NormalizedTable<R>> {
    let mut table = NormalizedTable::<R>::default();

    for ds in raw {
        if ds.kind != R::KIND {
            return Err(DashboardError::schema(
                R::KIND,
                format!("cannot normalize {} data from {} as {}", ds.kind, ds.source, R::KIND),
            ));
        }
        if ds.records.is_empty() {
            warn!(source = %ds.source, "skipping dataset without records");
            continue;
        }

        let (header_idx, columns) = locate_header::<R>(&ds.records).map_err(|detail| {
            DashboardError::schema(R::KIND, format!("{} ({})", detail, ds.source))
        })?;
        debug!(source = %ds.source, header_idx, mapped = columns.len(), "located header");

        for record in &ds.records[header_idx + 1..] {
            table.report.records_read += 1;
            if record.iter().all(|cell| clean_str(cell).is_empty()) {
                table.report.empty_rows += 1;
                continue;
            }
            match R::from_fields(&Fields::new(&columns, record), ds.period) {
                Ok(row) => table.insert(row),
                Err(why) => table.report.reject(why),
            }
        }
    }

    let report = table.report();
    info!(
        rows = table.len(),
        read = report.records_read,
        empty = report.empty_rows,
        rejected = report.rejected_total(),
        replaced = report.replaced,
        "normalized"
    );
    if report.rejected_total() > 0 {
        debug!(reasons = ?report.rejected, "rejected rows");
    }
    Ok(table)
}
