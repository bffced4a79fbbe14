// src/process/enrollment.rs

use arrow::array::{ArrayRef, StringArray, UInt16Array, UInt64Array, UInt8Array};
use serde::Serialize;
use std::sync::Arc;

use super::states::canonical_state;
use super::utils::county_code;
use super::{CanonicalRow, Fields, NormalizedTable, Rejection};
use crate::schema::{ColumnSpec, ColumnType, DatasetKind, Period};

/// Monthly enrollment for one plan in one county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRecord {
    pub state: String,
    pub county: String,
    pub contract_id: String,
    pub plan_id: String,
    /// SSA state+county code, the ratebook join key.
    pub ssa_code: Option<String>,
    pub fips_code: Option<String>,
    pub year: u16,
    pub month: u8,
    pub enrollees: u64,
}

pub type EnrollmentTable = NormalizedTable<EnrollmentRecord>;

impl EnrollmentRecord {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
        }
    }
}

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::sourced("state", ColumnType::Text, &["State", "State Code"], true),
    ColumnSpec::sourced("county", ColumnType::Text, &["County", "County Name"], true),
    ColumnSpec::sourced(
        "contract_id",
        ColumnType::Text,
        &["Contract Number", "Contract ID", "Contract"],
        true,
    ),
    ColumnSpec::sourced("plan_id", ColumnType::Text, &["Plan ID", "Plan"], true),
    ColumnSpec::sourced(
        "ssa_code",
        ColumnType::Text,
        &["SSA State County Code", "SSA State/County Code", "SSA Code", "SSA"],
        false,
    ),
    ColumnSpec::sourced(
        "fips_code",
        ColumnType::Text,
        &["FIPS State County Code", "FIPS State/County Code", "FIPS Code", "FIPS"],
        false,
    ),
    ColumnSpec::derived("year", ColumnType::Year, false),
    ColumnSpec::derived("month", ColumnType::Month, false),
    ColumnSpec::sourced(
        "enrollees",
        ColumnType::Count,
        &["Enrollment", "Enrolled", "Enrollees"],
        true,
    ),
];

impl CanonicalRow for EnrollmentRecord {
    const KIND: DatasetKind = DatasetKind::Enrollment;
    type Key = (String, String, String, String, u16, u8);

    fn columns() -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn from_fields(fields: &Fields<'_>, period: Period) -> Result<Self, Rejection> {
        let state = fields
            .text("state")
            .and_then(|s| canonical_state(&s))
            .ok_or(Rejection::MissingKey("state"))?;
        Ok(Self {
            state,
            county: fields.key("county")?,
            contract_id: fields.key("contract_id")?,
            plan_id: fields.key("plan_id")?,
            ssa_code: fields.text("ssa_code").and_then(|c| county_code(&c)),
            fips_code: fields.text("fips_code").and_then(|c| county_code(&c)),
            year: period.year,
            month: period.month,
            enrollees: fields.count("enrollees")?,
        })
    }

    fn key(&self) -> Self::Key {
        (
            self.state.clone(),
            self.county.clone(),
            self.contract_id.clone(),
            self.plan_id.clone(),
            self.year,
            self.month,
        )
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.state))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.county))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.contract_id),
            )),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.plan_id))),
            Arc::new(rows.iter().map(|r| r.ssa_code.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.fips_code.as_deref()).collect::<StringArray>()),
            Arc::new(UInt16Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.month))),
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.enrollees))),
        ]
    }
}
