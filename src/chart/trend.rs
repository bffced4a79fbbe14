use std::collections::BTreeMap;

use super::{ChartSpec, Point, Series, XyChart};
use crate::process::EnrollmentTable;
use crate::schema::Period;

/// Total enrollees per period across the whole table, oldest period first.
pub fn enrollment_trend(table: &EnrollmentTable) -> ChartSpec {
    let mut totals: BTreeMap<Period, u64> = BTreeMap::new();
    for row in table.rows() {
        *totals.entry(row.period()).or_default() += row.enrollees;
    }

    ChartSpec::Line(XyChart {
        title: "Medicare Advantage Enrollment Trend".to_string(),
        x_label: "Month".to_string(),
        y_label: "Enrollees".to_string(),
        series: vec![Series {
            name: "Total enrollment".to_string(),
            points: totals
                .into_iter()
                .map(|(period, total)| Point {
                    x: period.to_string(),
                    y: total as f64,
                })
                .collect(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::tests::enrollment_row;
    use crate::process::NormalizedTable;

    fn row(month: u8, year: u16, county: &str, enrollees: u64) -> crate::process::EnrollmentRecord {
        let mut r = enrollment_row("IL", county, "001", None, enrollees);
        r.year = year;
        r.month = month;
        r
    }

    #[test]
    fn sums_per_period_in_chronological_order() {
        let table = NormalizedTable::from_rows([
            row(1, 2023, "Cook", 500),
            row(12, 2022, "Cook", 480),
            row(1, 2023, "Lake", 20),
            row(2, 2023, "Cook", 510),
        ]);

        let ChartSpec::Line(chart) = enrollment_trend(&table) else {
            panic!("expected a line chart");
        };
        let points: Vec<(&str, f64)> = chart.series[0]
            .points
            .iter()
            .map(|p| (p.x.as_str(), p.y))
            .collect();
        assert_eq!(
            points,
            vec![("2022-12", 480.0), ("2023-01", 520.0), ("2023-02", 510.0)]
        );
    }

    #[test]
    fn is_deterministic() {
        let table = NormalizedTable::from_rows([
            row(3, 2023, "Cook", 5),
            row(1, 2023, "Cook", 7),
            row(2, 2023, "Lake", 9),
        ]);
        assert_eq!(enrollment_trend(&table), enrollment_trend(&table));
    }
}
