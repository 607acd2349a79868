//! Loading per-point inputs.
//!
//! Two document shapes are accepted: a JSON array of records
//! (`{"id", "longitude"|"lon", "latitude"|"lat", "water_use_m3y"}`) or a GeoJSON
//! FeatureCollection of Point features with an optional `asset_id` property.
//! Records without an identifier are named `site_1`, `site_2`, ...

use std::fs;
use std::path::Path;

use geojson::GeoJson;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::crs::CoordTransformer;
use crate::error::{Error, Result};
use crate::sampler::Point;
use crate::vector::collection_crs;

/// A point plus the auxiliary columns the analysis consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub point: Point,
    pub water_use_m3y: Option<f64>,
}

impl PointRecord {
    pub fn new(point: Point) -> Self {
        Self {
            point,
            water_use_m3y: None,
        }
    }
}

#[derive(Deserialize)]
struct RawRecord {
    /// String or number.
    #[serde(default, alias = "asset_id")]
    id: Option<JsonValue>,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(default)]
    water_use_m3y: Option<f64>,
}

pub fn load_points(path: &Path) -> Result<Vec<PointRecord>> {
    let text = fs::read_to_string(path)?;
    let records = parse_points(&text)?;
    debug!(path = %path.display(), n = records.len(), "loaded points");
    Ok(records)
}

pub fn parse_points(text: &str) -> Result<Vec<PointRecord>> {
    let value: JsonValue = serde_json::from_str(text)?;
    let records = match value {
        JsonValue::Array(_) => from_records(value)?,
        JsonValue::Object(ref obj) if obj.get("type").and_then(|t| t.as_str()).is_some() => {
            from_geojson(GeoJson::from_json_value(value)?)?
        }
        _ => {
            return Err(Error::InvalidPoints(
                "expected a JSON array of records or a GeoJSON FeatureCollection".into(),
            ))
        }
    };
    for r in &records {
        if !r.point.lon.is_finite() || !r.point.lat.is_finite() {
            return Err(Error::InvalidPoints(format!("point '{}' has non-finite coordinates", r.point.id)));
        }
    }
    Ok(records)
}

fn default_id(i: usize) -> String {
    format!("site_{}", i + 1)
}

fn id_text(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn from_records(value: JsonValue) -> Result<Vec<PointRecord>> {
    let raw: Vec<RawRecord> = serde_json::from_value(value)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| PointRecord {
            point: Point::new(id_text(r.id.as_ref()).unwrap_or_else(|| default_id(i)), r.longitude, r.latitude),
            water_use_m3y: r.water_use_m3y,
        })
        .collect())
}

fn from_geojson(doc: GeoJson) -> Result<Vec<PointRecord>> {
    let GeoJson::FeatureCollection(fc) = doc else {
        return Err(Error::InvalidPoints("GeoJSON points must be a FeatureCollection".into()));
    };
    let to_wgs84 = CoordTransformer::to_wgs84(collection_crs(&fc, "points")?)?;

    let mut out = Vec::with_capacity(fc.features.len());
    for (i, feature) in fc.features.iter().enumerate() {
        let Some(geojson::Value::Point(coords)) = feature.geometry.as_ref().map(|g| &g.value) else {
            return Err(Error::InvalidPoints(format!("feature {i} is not a Point")));
        };
        if coords.len() < 2 {
            return Err(Error::InvalidPoints(format!("feature {i} has fewer than two coordinates")));
        }
        let (lon, lat) = to_wgs84.transform(coords[0], coords[1])?;
        let id = id_text(feature.property("asset_id")).unwrap_or_else(|| default_id(i));
        let water_use_m3y = feature.property("water_use_m3y").and_then(JsonValue::as_f64);
        out.push(PointRecord {
            point: Point::new(id, lon, lat),
            water_use_m3y,
        });
    }
    Ok(out)
}
