use std::collections::BTreeMap;

use super::{ChartSpec, Point, Series, XyChart};
use crate::enrich::{EnrichedTable, StateFilter};

/// Total plan payments per county, ordered by county name.
///
/// Rows without a payment amount contribute nothing. Counties are grouped by
/// (county, state) so same-named counties in different states stay apart.
pub fn payment_by_county(table: &EnrichedTable, filter: &StateFilter) -> ChartSpec {
    let mut totals: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for row in table
        .rows
        .iter()
        .filter(|r| filter.matches(&r.enrollment.state))
    {
        if let Some(amount) = row.payment_amount {
            *totals
                .entry((row.enrollment.county.as_str(), row.enrollment.state.as_str()))
                .or_default() += amount;
        }
    }

    let points = totals
        .into_iter()
        .map(|((county, state), total)| Point {
            x: match filter {
                StateFilter::All => format!("{}, {}", county, state),
                StateFilter::Only(_) => county.to_string(),
            },
            y: total,
        })
        .collect();

    let title = match filter {
        StateFilter::All => "Medicare Advantage Payments by County".to_string(),
        StateFilter::Only(state) => format!("Medicare Advantage Payments by County, {}", state),
    };

    ChartSpec::Bar(XyChart {
        title,
        x_label: "County".to_string(),
        y_label: "Monthly payment ($)".to_string(),
        series: vec![Series {
            name: "Payment amount".to_string(),
            points,
        }],
    })
}
