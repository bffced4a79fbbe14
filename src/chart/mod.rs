// src/chart/mod.rs
//! Chart descriptions handed to the presentation layer.
//!
//! Builders are pure functions of their input tables: no I/O, no mutation, and
//! identical input always yields an identical chart.

pub mod map;
pub mod payment;
pub mod trend;

use serde::Serialize;
use std::collections::BTreeSet;

use crate::enrich::ALL_STATES;
use crate::process::{EnrollmentTable, Feature};

pub use map::penetration_map;
pub use payment::payment_by_county;
pub use trend::enrollment_trend;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartSpec {
    Line(XyChart),
    Bar(XyChart),
    Choropleth(ChoroplethMap),
}

/// Categorical x axis, numeric y axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XyChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethMap {
    pub title: String,
    pub regions: Vec<Region>,
    pub color_scale: ColorScale,
    pub geometry: GeoLayer,
}

/// One colored county. `location` matches the `id` of a feature in `geometry`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub location: String,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorScale {
    pub palette: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
}

/// GeoJSON FeatureCollection restricted to the mapped counties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLayer {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

/// Entry of the state selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    fn same(v: &str) -> Self {
        Self {
            label: v.to_string(),
            value: v.to_string(),
        }
    }
}

/// `All` followed by the distinct states present, sorted.
pub fn state_options(enrollment: &EnrollmentTable) -> Vec<SelectOption> {
    let states: BTreeSet<&str> = enrollment.rows().iter().map(|r| r.state.as_str()).collect();
    std::iter::once(SelectOption::same(ALL_STATES))
        .chain(states.into_iter().map(SelectOption::same))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::tests::enrollment_row;
    use crate::process::NormalizedTable;

    #[test]
    fn state_options_start_with_all() {
        let table = NormalizedTable::from_rows([
            enrollment_row("WI", "Dane", "001", None, 1),
            enrollment_row("IL", "Cook", "001", None, 1),
            enrollment_row("IL", "Lake", "001", None, 1),
        ]);
        let values: Vec<String> = state_options(&table).into_iter().map(|o| o.value).collect();
        assert_eq!(values, vec!["All", "IL", "WI"]);
    }

    #[test]
    fn chart_serializes_with_type_tag() {
        let spec = ChartSpec::Bar(XyChart {
            title: "t".to_string(),
            x_label: "x".to_string(),
            y_label: "y".to_string(),
            series: vec![],
        });
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "bar");
        assert_eq!(json["title"], "t");
    }
}
