//! Point sampling against a WGS84 sampling view.

use serde::{Deserialize, Serialize};

use crate::raster::SamplingView;
use crate::sample::Sample;

/// A WGS84 location with an opaque identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(id: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            lon,
            lat,
        }
    }
}

/// One sample per point, in input order.
///
/// Out-of-extent points, nodata cells and NaN cells all come back as
/// [`Sample::Missing`]; this never fails.
pub fn sample(view: &SamplingView<'_>, points: &[Point]) -> Vec<Sample> {
    points.iter().map(|p| view.sample_at(p.lon, p.lat)).collect()
}

/// Envelope `(min_lon, min_lat, max_lon, max_lat)` of a point set.
pub fn bounds(points: &[Point]) -> Option<(f64, f64, f64, f64)> {
    points.iter().fold(None, |acc, p| {
        Some(match acc {
            None => (p.lon, p.lat, p.lon, p.lat),
            Some((x0, y0, x1, y1)) => (x0.min(p.lon), y0.min(p.lat), x1.max(p.lon), y1.max(p.lat)),
        })
    })
}
