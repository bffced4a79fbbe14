// src/fetch/archive.rs

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, trace};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Open an in-memory ZIP and return the first file entry (archive order) whose
/// name matches `pattern`, as `(entry name, contents)`.
pub fn extract_entry(bytes: &[u8], pattern: &Regex) -> Result<Option<(String, Vec<u8>)>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Failed to read ZIP archive")?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{}", i))?;
        let name = entry.name().to_string();
        if !entry.is_file() || !pattern.is_match(&name) {
            trace!(entry = %name, "skipping archive entry");
            continue;
        }

        // declared sizes are untrusted, let the buffer grow
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read {} into memory", name))?;
        debug!(entry = %name, bytes = buf.len(), "extracted archive entry");
        return Ok(Some((name, buf)));
    }

    Ok(None)
}

/// Decode delimited text into records. No header handling: every line is a record.
/// Fields are decoded lossily since the published files are not always UTF-8.
pub fn read_records(data: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(data));

    let mut records = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        records.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }
    Ok(records)
}
