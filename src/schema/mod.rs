pub mod arrow;
pub mod types;

pub use arrow::{build_arrow_schema, build_record_batch, map_to_arrow_type};
pub use types::{ColumnSpec, ColumnType, DatasetKind, Period};
