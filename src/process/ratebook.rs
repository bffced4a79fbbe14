// src/process/ratebook.rs

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt16Array};
use serde::Serialize;
use std::sync::Arc;

use super::states::canonical_state;
use super::utils::county_code;
use super::{CanonicalRow, Fields, NormalizedTable, Rejection};
use crate::schema::{ColumnSpec, ColumnType, DatasetKind, Period};

/// Published monthly county payment rate for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatebookRecord {
    pub ssa_code: String,
    pub year: u16,
    pub state: Option<String>,
    pub county: Option<String>,
    pub payment_rate: f64,
}

pub type RatebookTable = NormalizedTable<RatebookRecord>;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::sourced(
        "ssa_code",
        ColumnType::Text,
        &["Code", "SSA Code", "SSA State County Code", "SSA"],
        true,
    ),
    ColumnSpec::derived("year", ColumnType::Year, false),
    ColumnSpec::sourced("state", ColumnType::Text, &["State", "State Name"], false),
    ColumnSpec::sourced("county", ColumnType::Text, &["County Name", "County"], false),
    // the unbonused Parts A&B rate is preferred when a ratebook lists several
    ColumnSpec::sourced(
        "payment_rate",
        ColumnType::Amount,
        &[
            "Parts A&B 0% Bonus County Rate",
            "Parts A&B 0% Bonus",
            "Parts A&B",
            "Payment Rate",
            "County Rate",
            "Rate",
        ],
        true,
    ),
];

impl CanonicalRow for RatebookRecord {
    const KIND: DatasetKind = DatasetKind::Ratebook;
    type Key = (String, u16);

    fn columns() -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn from_fields(fields: &Fields<'_>, period: Period) -> Result<Self, Rejection> {
        Ok(Self {
            ssa_code: fields
                .text("ssa_code")
                .and_then(|c| county_code(&c))
                .ok_or(Rejection::MissingKey("ssa_code"))?,
            year: period.year,
            state: fields.text("state").and_then(|s| canonical_state(&s)),
            county: fields.text("county"),
            payment_rate: fields.amount("payment_rate")?,
        })
    }

    fn key(&self) -> Self::Key {
        (self.ssa_code.clone(), self.year)
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.ssa_code))),
            Arc::new(UInt16Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(rows.iter().map(|r| r.state.as_deref()).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.county.as_deref()).collect::<StringArray>()),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.payment_rate),
            )),
        ]
    }
}
