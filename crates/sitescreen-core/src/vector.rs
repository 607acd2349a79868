//! Vector zone assignment: land-cover codes from polygon layers.
//!
//! Reads a GeoJSON FeatureCollection, keeps only the polygons whose envelope
//! touches a padded box around the points, reprojects them to WGS84 and joins
//! each point to the polygons it intersects. A point inside several polygons
//! takes the first one in file order.

use std::fs;
use std::path::Path;

use geo::{Coord, Intersects, LineString, MultiPolygon, Polygon};
use geojson::{FeatureCollection, GeoJson, JsonObject};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::crs::{CoordTransformer, Crs};
use crate::error::{Error, Result};
use crate::sample::Sample;
use crate::sampler::{bounds, Point};

/// Attribute names tried, in order, for the land-cover code.
pub const CODE_FIELDS: [&str; 6] = ["CODE_18", "CLC_CODE", "CLC_CODE18", "code_18", "CODE", "CLC_CODE_18"];

/// Padding of the read window around the points, about 50 m at mid latitudes.
pub const BBOX_PAD_DEG: f64 = 0.0005;

type Envelope = (f64, f64, f64, f64);

struct Zone {
    polygons: MultiPolygon<f64>,
    properties: JsonObject,
}

struct ZoneBox {
    index: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for ZoneBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// CRS of a FeatureCollection from its legacy `crs` member.
///
/// No member means WGS84. A member that names no EPSG code is treated as a
/// source without a CRS.
pub(crate) fn collection_crs(fc: &FeatureCollection, origin: &str) -> Result<Crs> {
    let Some(member) = fc.foreign_members.as_ref().and_then(|m| m.get("crs")) else {
        return Ok(Crs::WGS84);
    };
    let props = member.get("properties");
    let parsed = match member.get("type").and_then(JsonValue::as_str) {
        Some("EPSG") => props
            .and_then(|p| p.get("code"))
            .and_then(JsonValue::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .map(Crs::from_epsg),
        _ => props
            .and_then(|p| p.get("name"))
            .and_then(JsonValue::as_str)
            .and_then(Crs::parse),
    };
    parsed.ok_or_else(|| Error::MissingCrs {
        path: origin.to_string(),
    })
}

/// Land-cover code for each point from a polygon file, in input order.
pub fn assign_zone(points: &[Point], path: &Path) -> Result<Vec<Sample>> {
    let text = fs::read_to_string(path)?;
    assign_zone_from_str(points, &text, &path.display().to_string())
}

/// As [`assign_zone`], for an in-memory GeoJSON document.
pub fn assign_zone_from_str(points: &[Point], text: &str, origin: &str) -> Result<Vec<Sample>> {
    let Some((x0, y0, x1, y1)) = bounds(points) else {
        return Ok(Vec::new());
    };
    let fc = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(Error::NoCodeField {
                path: origin.to_string(),
                tried: CODE_FIELDS.join(", "),
            })
        }
    };

    let crs = collection_crs(&fc, origin)?;
    let window = (x0 - BBOX_PAD_DEG, y0 - BBOX_PAD_DEG, x1 + BBOX_PAD_DEG, y1 + BBOX_PAD_DEG);
    let native_window = CoordTransformer::from_wgs84(crs)?.transform_bounds(window)?;
    let to_wgs84 = CoordTransformer::to_wgs84(crs)?;

    let mut zones = Vec::new();
    for feature in &fc.features {
        let Some(geometry) = &feature.geometry else { continue };
        let Some(polygons) = to_multipolygon(&geometry.value) else { continue };
        let Some(env) = envelope(&polygons) else { continue };
        if !overlaps(env, native_window) {
            continue;
        }
        zones.push(Zone {
            polygons: reproject(&polygons, &to_wgs84)?,
            properties: feature.properties.clone().unwrap_or_default(),
        });
    }
    debug!(source = origin, %crs, total = fc.features.len(), kept = zones.len(), "read zone polygons");

    if zones.is_empty() {
        warn!(source = origin, "no zone polygons near the points");
        return Ok(vec![Sample::Missing; points.len()]);
    }

    let field = pick_code_field(&zones).ok_or_else(|| Error::NoCodeField {
        path: origin.to_string(),
        tried: CODE_FIELDS.join(", "),
    })?;
    debug!(source = origin, field = %field, "zone code field");

    let codes: Vec<Option<i64>> = zones.iter().map(|z| normalise_code(z.properties.get(&field))).collect();

    let boxes = zones
        .iter()
        .enumerate()
        .filter_map(|(index, z)| {
            let (a, b, c, d) = envelope(&z.polygons)?;
            Some(ZoneBox {
                index,
                env: AABB::from_corners([a, b], [c, d]),
            })
        })
        .collect();
    let tree = RTree::bulk_load(boxes);

    Ok(points
        .iter()
        .map(|p| {
            let pt = geo::Point::new(p.lon, p.lat);
            tree.locate_in_envelope_intersecting(&AABB::from_point([p.lon, p.lat]))
                .filter(|zb| zones[zb.index].polygons.intersects(&pt))
                .map(|zb| zb.index)
                .min()
                .and_then(|i| codes[i])
                .map_or(Sample::Missing, |c| Sample::Value(c as f64))
        })
        .collect())
}

/// First known code field present on any zone, else the first numeric
/// attribute (sorted by name) of the first zone that has one.
fn pick_code_field(zones: &[Zone]) -> Option<String> {
    for name in CODE_FIELDS {
        if zones.iter().any(|z| z.properties.contains_key(name)) {
            return Some(name.to_string());
        }
    }
    zones.iter().find_map(|z| {
        let mut keys: Vec<&String> = z
            .properties
            .iter()
            .filter(|(_, v)| v.is_number())
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        keys.first().map(|k| (*k).clone())
    })
}

fn normalise_code(value: Option<&JsonValue>) -> Option<i64> {
    let v = match value? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then(|| v.trunc() as i64)
}

fn ring(coords: &[Vec<f64>]) -> LineString<f64> {
    coords
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(ring(exterior), interiors.iter().map(|r| ring(r)).collect()))
}

fn to_multipolygon(value: &geojson::Value) -> Option<MultiPolygon<f64>> {
    match value {
        geojson::Value::Polygon(rings) => polygon(rings).map(|p| MultiPolygon::new(vec![p])),
        geojson::Value::MultiPolygon(parts) => {
            let polys: Vec<_> = parts.iter().filter_map(|r| polygon(r)).collect();
            (!polys.is_empty()).then(|| MultiPolygon::new(polys))
        }
        _ => None,
    }
}

fn envelope(mp: &MultiPolygon<f64>) -> Option<Envelope> {
    mp.0.iter()
        .flat_map(|p| p.exterior().coords())
        .fold(None, |acc, c| {
            Some(match acc {
                None => (c.x, c.y, c.x, c.y),
                Some((a, b, d, e)) => (a.min(c.x), b.min(c.y), d.max(c.x), e.max(c.y)),
            })
        })
}

fn overlaps(a: Envelope, b: Envelope) -> bool {
    a.0 <= b.2 && a.2 >= b.0 && a.1 <= b.3 && a.3 >= b.1
}

fn reproject(mp: &MultiPolygon<f64>, t: &CoordTransformer) -> Result<MultiPolygon<f64>> {
    if t.is_identity() {
        return Ok(mp.clone());
    }
    let ring = |ls: &LineString<f64>| -> Result<LineString<f64>> {
        ls.coords()
            .map(|c| t.transform(c.x, c.y).map(|(x, y)| Coord { x, y }))
            .collect::<Result<Vec<_>>>()
            .map(LineString::from)
    };
    let polys = mp
        .0
        .iter()
        .map(|p| {
            let interiors = p.interiors().iter().map(ring).collect::<Result<Vec<_>>>()?;
            Ok(Polygon::new(ring(p.exterior())?, interiors))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MultiPolygon::new(polys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> String {
        format!(
            "[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]",
            x1 = x0 + size,
            y1 = y0 + size
        )
    }

    fn collection(features: &[(String, &str)], crs: Option<&str>) -> String {
        let feats: Vec<String> = features
            .iter()
            .map(|(coords, props)| {
                format!(r#"{{"type":"Feature","properties":{props},"geometry":{{"type":"Polygon","coordinates":{coords}}}}}"#)
            })
            .collect();
        let crs = crs
            .map(|name| format!(r#","crs":{{"type":"name","properties":{{"name":"{name}"}}}}"#))
            .unwrap_or_default();
        format!(r#"{{"type":"FeatureCollection"{crs},"features":[{}]}}"#, feats.join(","))
    }

    #[test]
    fn joins_points_to_containing_polygon() {
        let doc = collection(
            &[
                (square(10.0, 45.0, 0.01), r#"{"CODE_18":"311"}"#),
                (square(10.01, 45.0, 0.01), r#"{"CODE_18":"112"}"#),
            ],
            None,
        );
        let pts = [
            Point::new("a", 10.005, 45.005),
            Point::new("b", 10.015, 45.005),
            Point::new("c", 10.005, 45.02),
        ];
        let codes = assign_zone_from_str(&pts, &doc, "clc.geojson").unwrap();
        assert_eq!(codes, vec![Sample::Value(311.0), Sample::Value(112.0), Sample::Missing]);
    }

    #[test]
    fn overlapping_polygons_take_first_in_file_order() {
        let doc = collection(
            &[
                (square(0.0, 0.0, 1.0), r#"{"CLC_CODE":512}"#),
                (square(0.0, 0.0, 1.0), r#"{"CLC_CODE":311}"#),
            ],
            None,
        );
        let codes = assign_zone_from_str(&[Point::new("a", 0.5, 0.5)], &doc, "clc").unwrap();
        assert_eq!(codes, vec![Sample::Value(512.0)]);
    }

    #[test]
    fn falls_back_to_first_numeric_field() {
        let doc = collection(&[(square(0.0, 0.0, 1.0), r#"{"label":"forest","zone":312.0,"area":5}"#)], None);
        let codes = assign_zone_from_str(&[Point::new("a", 0.5, 0.5)], &doc, "clc").unwrap();
        // "area" sorts before "zone".
        assert_eq!(codes, vec![Sample::Value(5.0)]);
    }

    #[test]
    fn no_code_field_is_a_configuration_error() {
        let doc = collection(&[(square(0.0, 0.0, 1.0), r#"{"label":"forest"}"#)], None);
        let err = assign_zone_from_str(&[Point::new("a", 0.5, 0.5)], &doc, "clc").unwrap_err();
        assert!(matches!(err, Error::NoCodeField { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn nothing_near_points_is_all_missing() {
        let doc = collection(&[(square(0.0, 0.0, 1.0), r#"{"label":"forest"}"#)], None);
        let codes = assign_zone_from_str(&[Point::new("a", 20.0, 20.0), Point::new("b", 21.0, 20.0)], &doc, "clc")
            .unwrap();
        assert_eq!(codes, vec![Sample::Missing; 2]);
    }

    #[test]
    fn projected_polygons_are_reprojected() {
        // 0..10 km web-mercator square around the origin.
        let doc = collection(&[(square(0.0, 0.0, 10_000.0), r#"{"CODE_18":211}"#)], Some("EPSG:3857"));
        let codes = assign_zone_from_str(
            &[Point::new("in", 0.04, 0.04), Point::new("out", 0.2, 0.04)],
            &doc,
            "clc",
        )
        .unwrap();
        assert_eq!(codes, vec![Sample::Value(211.0), Sample::Missing]);
    }

    #[test]
    fn unreadable_crs_member_is_missing_crs() {
        let doc = collection(&[(square(0.0, 0.0, 1.0), r#"{"CODE_18":211}"#)], Some("LOCAL_CS"));
        let err = assign_zone_from_str(&[Point::new("a", 0.5, 0.5)], &doc, "clc").unwrap_err();
        assert!(matches!(err, Error::MissingCrs { .. }));
    }

    #[test]
    fn code_normalisation() {
        assert_eq!(normalise_code(Some(&JsonValue::from(" 324 "))), Some(324));
        assert_eq!(normalise_code(Some(&JsonValue::from(311.9))), Some(311));
        assert_eq!(normalise_code(Some(&JsonValue::from("n/a"))), None);
        assert_eq!(normalise_code(Some(&JsonValue::Null)), None);
        assert_eq!(normalise_code(None), None);
    }
}
