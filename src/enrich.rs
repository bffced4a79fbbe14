// src/enrich.rs
//! Left join of enrollment onto ratebook payment rates.

use arrow::{
    array::{ArrayRef, Float64Array},
    record_batch::RecordBatch,
};
use serde::{Serialize, Serializer};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use tracing::{debug, info, instrument};

use crate::error::{DashboardError, Result};
use crate::process::{CanonicalRow, EnrollmentRecord, EnrollmentTable, RatebookTable};
use crate::schema::{build_record_batch, ColumnSpec, ColumnType};

/// Sentinel accepted from the state selector for "no filter".
pub const ALL_STATES: &str = "All";

/// Restrict output to one state, or keep everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateFilter {
    #[default]
    All,
    Only(String),
}

impl StateFilter {
    pub fn matches(&self, state: &str) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Only(s) => s == state,
        }
    }
}

impl FromStr for StateFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ALL_STATES) {
            Ok(StateFilter::All)
        } else {
            Ok(StateFilter::Only(trimmed.to_ascii_uppercase()))
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFilter::All => f.write_str(ALL_STATES),
            StateFilter::Only(s) => f.write_str(s),
        }
    }
}

impl Serialize for StateFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An enrollment row with its county payment rate attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub enrollment: EnrollmentRecord,
    pub payment_rate: Option<f64>,
    /// `enrollees × payment_rate`, present exactly when the rate is.
    pub payment_amount: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichedTable {
    pub rows: Vec<EnrichedRecord>,
    /// Rows that found a ratebook rate (before any state filter).
    pub matched: usize,
    pub unmatched: usize,
}

impl EnrichedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let enrollment: Vec<EnrollmentRecord> =
            self.rows.iter().map(|r| r.enrollment.clone()).collect();
        let mut arrays = EnrollmentRecord::to_arrays(&enrollment);
        arrays.push(Arc::new(
            self.rows.iter().map(|r| r.payment_rate).collect::<Float64Array>(),
        ) as ArrayRef);
        arrays.push(Arc::new(
            self.rows.iter().map(|r| r.payment_amount).collect::<Float64Array>(),
        ) as ArrayRef);

        let mut cols: Vec<ColumnSpec> = EnrollmentRecord::columns().to_vec();
        cols.push(ColumnSpec::derived("payment_rate", ColumnType::Amount, true));
        cols.push(ColumnSpec::derived("payment_amount", ColumnType::Amount, true));
        build_record_batch(&cols, arrays)
    }
}

/// Attach ratebook rates to every enrollment row on (SSA county code, year).
///
/// Rows without a rate are kept with null payment fields. It is an error only when the
/// enrollment table is non-empty and not a single row finds a rate.
#[instrument(level = "info", skip(enrollment, ratebook), fields(enrollment = enrollment.len(), ratebook = ratebook.len()))]
pub fn enrich(
    enrollment: &EnrollmentTable,
    ratebook: &RatebookTable,
    filter: &StateFilter,
) -> Result<EnrichedTable> {
    let rates: HashMap<(&str, u16), f64> = ratebook
        .rows()
        .iter()
        .map(|r| ((r.ssa_code.as_str(), r.year), r.payment_rate))
        .collect();

    let mut table = EnrichedTable::default();
    let mut joined = Vec::with_capacity(enrollment.len());
    for row in enrollment.rows() {
        let payment_rate = row
            .ssa_code
            .as_deref()
            .and_then(|code| rates.get(&(code, row.year)).copied());
        if payment_rate.is_some() {
            table.matched += 1;
        } else {
            table.unmatched += 1;
        }
        joined.push(EnrichedRecord {
            enrollment: row.clone(),
            payment_rate,
            payment_amount: payment_rate.map(|rate| row.enrollees as f64 * rate),
        });
    }

    if !enrollment.is_empty() && table.matched == 0 {
        let year = enrollment.rows()[0].year;
        return Err(DashboardError::JoinMismatch {
            rows: enrollment.len(),
            year,
        });
    }

    table.rows = joined
        .into_iter()
        .filter(|r| filter.matches(&r.enrollment.state))
        .collect();

    info!(
        matched = table.matched,
        unmatched = table.unmatched,
        kept = table.rows.len(),
        filter = %filter,
        "enriched"
    );
    if table.unmatched > 0 {
        debug!(unmatched = table.unmatched, "rows without a ratebook rate");
    }
    Ok(table)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::process::{NormalizedTable, RatebookRecord};

    pub(crate) fn enrollment_row(
        state: &str,
        county: &str,
        plan: &str,
        ssa: Option<&str>,
        enrollees: u64,
    ) -> EnrollmentRecord {
        EnrollmentRecord {
            state: state.to_string(),
            county: county.to_string(),
            contract_id: "H1234".to_string(),
            plan_id: plan.to_string(),
            ssa_code: ssa.map(str::to_string),
            fips_code: None,
            year: 2023,
            month: 1,
            enrollees,
        }
    }

    pub(crate) fn rate(ssa: &str, year: u16, payment_rate: f64) -> RatebookRecord {
        RatebookRecord {
            ssa_code: ssa.to_string(),
            year,
            state: None,
            county: None,
            payment_rate,
        }
    }

    #[test]
    fn cook_county_payment() {
        let enrollment =
            NormalizedTable::from_rows([enrollment_row("IL", "Cook", "001", Some("14141"), 500)]);
        let ratebook = NormalizedTable::from_rows([rate("14141", 2023, 1050.00)]);

        let enriched = enrich(&enrollment, &ratebook, &StateFilter::All).unwrap();

        let row = &enriched.rows[0];
        assert_eq!(row.payment_rate, Some(1050.0));
        assert!((row.payment_amount.unwrap() - 525_000.0).abs() < 1e-6);
    }

    #[test]
    fn left_join_keeps_every_enrollment_row() {
        let enrollment = NormalizedTable::from_rows([
            enrollment_row("IL", "Cook", "001", Some("14141"), 500),
            enrollment_row("IL", "Lake", "001", Some("14480"), 40),
            enrollment_row("IL", "Cook", "002", None, 3),
            enrollment_row("AL", "Autauga", "001", Some("01000"), 12),
        ]);
        let ratebook = NormalizedTable::from_rows([
            rate("14141", 2023, 1050.0),
            rate("01000", 2023, 933.33),
            rate("14480", 2022, 1.0),
        ]);

        let enriched = enrich(&enrollment, &ratebook, &StateFilter::All).unwrap();

        assert_eq!(enriched.len(), enrollment.len());
        assert_eq!(enriched.matched, 2);
        assert_eq!(enriched.unmatched, 2);
        for row in &enriched.rows {
            match row.payment_rate {
                Some(r) => {
                    let expected = row.enrollment.enrollees as f64 * r;
                    assert!((row.payment_amount.unwrap() - expected).abs() < 1e-6);
                }
                None => assert!(row.payment_amount.is_none()),
            }
        }
    }

    #[test]
    fn no_match_at_all_is_join_mismatch() {
        let enrollment =
            NormalizedTable::from_rows([enrollment_row("IL", "Cook", "001", Some("14141"), 500)]);
        let ratebook = NormalizedTable::from_rows([rate("99999", 2023, 1.0)]);

        let err = enrich(&enrollment, &ratebook, &StateFilter::All).unwrap_err();
        assert!(matches!(err, DashboardError::JoinMismatch { rows: 1, year: 2023 }));
    }

    #[test]
    fn empty_enrollment_is_not_a_mismatch() {
        let enrollment: EnrollmentTable = NormalizedTable::default();
        let ratebook = NormalizedTable::from_rows([rate("14141", 2023, 1.0)]);
        assert!(enrich(&enrollment, &ratebook, &StateFilter::All)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn state_filter_applies_after_join() {
        let enrollment = NormalizedTable::from_rows([
            enrollment_row("IL", "Cook", "001", Some("14141"), 500),
            enrollment_row("AL", "Autauga", "001", Some("01000"), 12),
        ]);
        let ratebook = NormalizedTable::from_rows([rate("01000", 2023, 933.33)]);

        let enriched =
            enrich(&enrollment, &ratebook, &"il".parse::<StateFilter>().unwrap()).unwrap();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched.rows[0].enrollment.county, "Cook");
        assert!(enriched.rows[0].payment_amount.is_none());
    }

    #[test]
    fn parses_selector_sentinel() {
        assert_eq!("All".parse::<StateFilter>().unwrap(), StateFilter::All);
        assert_eq!(" ".parse::<StateFilter>().unwrap(), StateFilter::All);
        assert_eq!(
            "ny".parse::<StateFilter>().unwrap(),
            StateFilter::Only("NY".to_string())
        );
    }

    #[test]
    fn enriched_batch_appends_payment_columns() {
        let enrollment =
            NormalizedTable::from_rows([enrollment_row("IL", "Cook", "001", Some("14141"), 500)]);
        let ratebook = NormalizedTable::from_rows([rate("14141", 2023, 1050.0)]);
        let batch = enrich(&enrollment, &ratebook, &StateFilter::All)
            .unwrap()
            .to_record_batch()
            .unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema().field(batch.num_columns() - 1).name(), "payment_amount");
    }
}
