// src/schema/arrow.rs

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::types::{ColumnSpec, ColumnType};
use crate::error::{DashboardError, Result};

/// Map a canonical column type onto an Arrow DataType.
///
/// - Text   → Utf8
/// - Count  → UInt64
/// - Amount → Float64 (rates, percentages, dollars)
/// - Year   → UInt16
/// - Month  → UInt8
pub fn map_to_arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Count => DataType::UInt64,
        ColumnType::Amount => DataType::Float64,
        ColumnType::Year => DataType::UInt16,
        ColumnType::Month => DataType::UInt8,
    }
}

/// Build an ArrowSchema (inside an Arc) from a slice of canonical columns.
pub fn build_arrow_schema(cols: &[ColumnSpec]) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = cols
        .iter()
        .map(|col| ArrowField::new(col.name, map_to_arrow_type(col.ty), col.nullable))
        .collect();

    Arc::new(ArrowSchema::new(fields))
}

/// Assemble column arrays into a batch, checking them against the canonical schema.
pub fn build_record_batch(cols: &[ColumnSpec], arrays: Vec<ArrayRef>) -> Result<RecordBatch> {
    RecordBatch::try_new(build_arrow_schema(cols), arrays)
        .map_err(|e| DashboardError::Export(format!("building record batch: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLS: &[ColumnSpec] = &[
        ColumnSpec::sourced("state", ColumnType::Text, &["State"], true),
        ColumnSpec::sourced("fips_code", ColumnType::Text, &["FIPS"], false),
        ColumnSpec::derived("year", ColumnType::Year, false),
    ];

    #[test]
    fn schema_follows_column_specs() {
        let schema = build_arrow_schema(COLS);
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert!(!schema.field(0).is_nullable());
        assert!(schema.field(1).is_nullable());
        assert_eq!(schema.field(2).data_type(), &DataType::UInt16);
    }
}
