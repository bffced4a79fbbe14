use std::collections::BTreeMap;
use tracing::debug;

use super::{ChartSpec, ChoroplethMap, ColorScale, GeoLayer, Region};
use crate::process::{GeoShapes, PenetrationTable};
use crate::schema::Period;

/// County choropleth of MA penetration for `period`.
///
/// Counties without a boundary in `shapes` are left off the map. Regions are
/// ordered by FIPS code and the color scale spans the mapped values.
pub fn penetration_map(table: &PenetrationTable, shapes: &GeoShapes, period: Period) -> ChartSpec {
    let mut regions: BTreeMap<&str, Region> = BTreeMap::new();
    let mut unmapped = 0usize;

    for row in table.rows().iter().filter(|r| r.period() == period) {
        if shapes.get(&row.fips_code).is_none() {
            unmapped += 1;
            continue;
        }
        regions.insert(
            row.fips_code.as_str(),
            Region {
                location: row.fips_code.clone(),
                label: format!("{}, {}", row.county, row.state),
                value: row.penetration_rate,
            },
        );
    }
    if unmapped > 0 {
        debug!(unmapped, "counties without geometry left off the map");
    }

    let (min, max) = regions
        .values()
        .map(|r| r.value)
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0));

    let features = regions
        .keys()
        .filter_map(|fips| shapes.get(fips).cloned())
        .collect();

    ChartSpec::Choropleth(ChoroplethMap {
        title: format!("Medicare Advantage Penetration Rate by County, {}", period),
        regions: regions.into_values().collect(),
        color_scale: ColorScale {
            palette: "Viridis".to_string(),
            label: "Penetration (%)".to_string(),
            min,
            max,
        },
        geometry: GeoLayer {
            kind: "FeatureCollection",
            features,
        },
    })
}
