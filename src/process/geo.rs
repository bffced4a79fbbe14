// src/process/geo.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::utils::county_code;

/// A GeoJSON feature. Geometry is carried through untouched for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub geometry: Value,
}

fn feature_type() -> String {
    "Feature".to_string()
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

/// County boundaries keyed by 5-digit FIPS code.
#[derive(Debug, Clone, Default)]
pub struct GeoShapes {
    features: BTreeMap<String, Feature>,
}

impl GeoShapes {
    /// Parse a GeoJSON FeatureCollection. Features without a usable county id are skipped.
    pub fn from_geojson(bytes: &[u8]) -> Result<Self> {
        let collection: FeatureCollection =
            serde_json::from_slice(bytes).context("parsing GeoJSON FeatureCollection")?;

        let total = collection.features.len();
        let features: BTreeMap<String, Feature> = collection
            .features
            .into_iter()
            .filter_map(|mut f| {
                let fips = feature_fips(&f)?;
                // renderers join regions on the feature id
                f.id = Some(Value::String(fips.clone()));
                Some((fips, f))
            })
            .collect();

        debug!(total, keyed = features.len(), "parsed county shapes");
        Ok(Self { features })
    }

    pub fn get(&self, fips: &str) -> Option<&Feature> {
        self.features.get(fips)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<(String, Feature)> for GeoShapes {
    fn from_iter<I: IntoIterator<Item = (String, Feature)>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

/// County id from `id`, then `GEOID`/`FIPS` properties, then `STATE` + `COUNTY`.
fn feature_fips(f: &Feature) -> Option<String> {
    let as_code = |v: &Value| match v {
        Value::String(s) => county_code(s),
        Value::Number(n) => county_code(&n.to_string()),
        _ => None,
    };

    if let Some(code) = f.id.as_ref().and_then(as_code) {
        return Some(code);
    }
    for key in ["GEOID", "FIPS", "fips"] {
        if let Some(code) = f.properties.get(key).and_then(as_code) {
            return Some(code);
        }
    }
    match (f.properties.get("STATE"), f.properties.get("COUNTY")) {
        (Some(Value::String(s)), Some(Value::String(c))) => county_code(&format!("{}{}", s, c)),
        _ => None,
    }
}
