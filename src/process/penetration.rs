// src/process/penetration.rs

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt16Array, UInt64Array, UInt8Array};
use serde::Serialize;
use std::sync::Arc;

use super::states::canonical_state;
use super::utils::county_code;
use super::{CanonicalRow, Fields, NormalizedTable, Rejection};
use crate::schema::{ColumnSpec, ColumnType, DatasetKind, Period};

/// MA penetration for one county and month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenetrationRecord {
    pub state: String,
    pub county: String,
    /// Census county code, the key into `GeoShapes`.
    pub fips_code: String,
    pub ssa_code: Option<String>,
    pub year: u16,
    pub month: u8,
    pub eligibles: Option<u64>,
    pub enrolled: Option<u64>,
    /// Percent of eligibles enrolled in MA (0-100).
    pub penetration_rate: f64,
}

pub type PenetrationTable = NormalizedTable<PenetrationRecord>;

impl PenetrationRecord {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
        }
    }
}

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::sourced("state", ColumnType::Text, &["State Name", "State"], true),
    ColumnSpec::sourced("county", ColumnType::Text, &["County Name", "County"], true),
    ColumnSpec::sourced(
        "fips_code",
        ColumnType::Text,
        &["FIPST/Cnty", "FIPS State County Code", "FIPS Code", "FIPS"],
        true,
    ),
    ColumnSpec::sourced(
        "ssa_code",
        ColumnType::Text,
        &["SSA ST/CNTY", "SSA State County Code", "SSA Code", "SSA"],
        false,
    ),
    ColumnSpec::derived("year", ColumnType::Year, false),
    ColumnSpec::derived("month", ColumnType::Month, false),
    ColumnSpec::sourced("eligibles", ColumnType::Count, &["Eligibles"], false),
    ColumnSpec::sourced("enrolled", ColumnType::Count, &["Enrolled", "Enrollment"], false),
    ColumnSpec::sourced(
        "penetration_rate",
        ColumnType::Amount,
        &["Penetration", "Penetration Rate"],
        true,
    ),
];

impl CanonicalRow for PenetrationRecord {
    const KIND: DatasetKind = DatasetKind::Penetration;
    type Key = (String, String, u16, u8);

    fn columns() -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn from_fields(fields: &Fields<'_>, period: Period) -> Result<Self, Rejection> {
        let state = fields
            .text("state")
            .and_then(|s| canonical_state(&s))
            .ok_or(Rejection::MissingKey("state"))?;
        let county = fields.key("county")?;
        let fips_code = fields
            .text("fips_code")
            .and_then(|c| county_code(&c))
            .ok_or(Rejection::MissingKey("fips_code"))?;
        let eligibles = fields.optional_count("eligibles")?;
        let enrolled = fields.optional_count("enrolled")?;

        // a blank or masked rate can still be derived from the counts
        let penetration_rate = match fields.optional_amount("penetration_rate")? {
            Some(rate) => rate,
            None => match (enrolled, eligibles) {
                (Some(e), Some(total)) if total > 0 => e as f64 / total as f64 * 100.0,
                _ => return Err(Rejection::MissingValue("penetration_rate")),
            },
        };

        Ok(Self {
            state,
            county,
            fips_code,
            ssa_code: fields.text("ssa_code").and_then(|c| county_code(&c)),
            year: period.year,
            month: period.month,
            eligibles,
            enrolled,
            penetration_rate,
        })
    }

    fn key(&self) -> Self::Key {
        (self.state.clone(), self.county.clone(), self.year, self.month)
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.state))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.county))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.fips_code))),
            Arc::new(rows.iter().map(|r| r.ssa_code.as_deref()).collect::<StringArray>()),
            Arc::new(UInt16Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.month))),
            Arc::new(rows.iter().map(|r| r.eligibles).collect::<UInt64Array>()),
            Arc::new(rows.iter().map(|r| r.enrolled).collect::<UInt64Array>()),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.penetration_rate),
            )),
        ]
    }
}
