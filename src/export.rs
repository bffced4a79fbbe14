// src/export.rs

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::error::{DashboardError, Result};

/// Write one batch to a Snappy-compressed Parquet file, replacing any existing file.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    let export = |what: &str, e: &dyn std::fmt::Display| {
        DashboardError::Export(format!("{} {}: {}", what, path.display(), e))
    };

    let file = File::create(path).map_err(|e| export("creating", &e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| export("opening writer for", &e))?;
    writer.write(batch).map_err(|e| export("writing", &e))?;
    writer.close().map_err(|e| export("closing", &e))?;

    info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}
