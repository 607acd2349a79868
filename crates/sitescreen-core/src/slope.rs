//! Terrain slope from elevation using Horn's (1981) 3×3 operator.
//!
//! Two entry points:
//! - [`slope_percent_3x3`] estimates slope at individual points on a WGS84
//!   sampling view. Screening grade only; a precomputed slope layer, when
//!   available, replaces it entirely.
//! - [`gradient_grid`] computes the gradient magnitude of a whole DEM for the
//!   raster pipelines and the slope preprocessing tool.
//!
//! Degree-based grids are converted to metres with a local scale of
//! 111 320 m per degree of latitude and 111 320 · cos(lat) m per degree of
//! longitude.

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::grid::Grid;
use crate::raster::{GeoTransform, SamplingView};
use crate::sample::Sample;
use crate::sampler::Point;

/// Metres per degree of latitude used for the local metric scale.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Where the slope column of a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlopeProvenance {
    /// Sampled from a supplied slope raster.
    #[serde(rename = "precomputed")]
    Precomputed,
    /// Estimated from the DEM with the 3×3 operator.
    #[serde(rename = "approx")]
    Approximate,
}

impl SlopeProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlopeProvenance::Precomputed => "precomputed",
            SlopeProvenance::Approximate => "approx",
        }
    }
}

/// Metres per degree `(lon, lat)` at a latitude.
#[inline]
pub fn metres_per_degree(lat: f64) -> (f64, f64) {
    (METRES_PER_DEGREE * lat.to_radians().cos(), METRES_PER_DEGREE)
}

/// Horn gradient `(dz/dx, dz/dy)` of a row-major 3×3 window (row 0 = north).
#[inline]
fn horn(z: &[[f64; 3]; 3], dx_m: f64, dy_m: f64) -> (f64, f64) {
    let dz_dx = ((z[0][2] + 2.0 * z[1][2] + z[2][2]) - (z[0][0] + 2.0 * z[1][0] + z[2][0])) / (8.0 * dx_m);
    let dz_dy = ((z[2][0] + 2.0 * z[2][1] + z[2][2]) - (z[0][0] + 2.0 * z[0][1] + z[0][2])) / (8.0 * dy_m);
    (dz_dx, dz_dy)
}

/// Slope in percent at each point, in input order.
///
/// Missing when the point is outside the view, lies within one pixel of the
/// edge, any of the nine cells is nodata, or the pixel size is degenerate.
pub fn slope_percent_3x3(view: &SamplingView<'_>, points: &[Point]) -> Vec<Sample> {
    points.iter().map(|p| slope_at(view, p.lon, p.lat)).collect()
}

fn slope_at(view: &SamplingView<'_>, lon: f64, lat: f64) -> Sample {
    let Some((row, col)) = view.index(lon, lat) else {
        return Sample::Missing;
    };
    if row == 0 || col == 0 || row + 1 >= view.height() || col + 1 >= view.width() {
        return Sample::Missing;
    }

    let mut z = [[0.0; 3]; 3];
    for (i, zr) in z.iter_mut().enumerate() {
        for (j, zc) in zr.iter_mut().enumerate() {
            match view.cell(row + i - 1, col + j - 1) {
                Sample::Value(v) => *zc = v,
                Sample::Missing => return Sample::Missing,
            }
        }
    }

    let t = view.transform();
    let (m_lon, m_lat) = metres_per_degree(lat);
    let dx_m = t.pixel_width * m_lon;
    let dy_m = -t.pixel_height * m_lat;
    if dx_m == 0.0 || dy_m == 0.0 {
        return Sample::Missing;
    }
    let (dz_dx, dz_dy) = horn(&z, dx_m, dy_m);
    Sample::finite(100.0 * dz_dx.hypot(dz_dy))
}

/// Gradient magnitude (rise over run) of every cell of a DEM grid.
///
/// Edge cells take one-sided differences: the window is clamped to the grid
/// and the run shrinks to the cells actually spanned. A cell is missing when
/// any cell of its window is missing. `crs` decides whether the transform is
/// in degrees (local metric scale per row) or already in metres.
pub fn gradient_grid(dem: &Grid, transform: &GeoTransform, crs: Crs) -> Grid {
    let (w, h) = (dem.width, dem.height);
    let mut out = Grid::missing(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    for r in 0..h {
        let (dx_m, dy_m) = if crs.is_geographic() {
            let (_, lat) = transform.pixel_center(r, 0);
            let (m_lon, m_lat) = metres_per_degree(lat);
            let (px, py) = transform.resolution();
            (px * m_lon, py * m_lat)
        } else {
            transform.resolution()
        };
        if dx_m == 0.0 || dy_m == 0.0 {
            continue;
        }

        let rows = [r.saturating_sub(1), r, (r + 1).min(h - 1)];
        'cell: for c in 0..w {
            let cols = [c.saturating_sub(1), c, (c + 1).min(w - 1)];
            let mut z = [[0.0; 3]; 3];
            for (zr, &rr) in z.iter_mut().zip(&rows) {
                for (zc, &cc) in zr.iter_mut().zip(&cols) {
                    match dem.get(rr, cc) {
                        Sample::Value(v) => *zc = v,
                        Sample::Missing => continue 'cell,
                    }
                }
            }
            // Horn divides by a two-cell run; a clamped window spans fewer.
            let (dz_dx, dz_dy) = horn(&z, dx_m * run(cols), dy_m * run(rows));
            out.set(r, c, Sample::finite(dz_dx.hypot(dz_dy)));
        }
    }
    out
}

/// Cells spanned by a clamped window, as a fraction of the full two-cell run.
/// A one-cell axis has no run; an infinite one zeroes that component.
fn run(idx: [usize; 3]) -> f64 {
    match idx[2] - idx[0] {
        0 => f64::INFINITY,
        n => n as f64 / 2.0,
    }
}

/// Slope in degrees for every cell of a DEM grid.
pub fn slope_degrees_grid(dem: &Grid, transform: &GeoTransform, crs: Crs) -> Grid {
    let mut g = gradient_grid(dem, transform, crs);
    for s in &mut g.data {
        *s = s.map(|v| v.atan().to_degrees());
    }
    g
}

/// Slope in percent for every cell of a DEM grid.
pub fn slope_percent_grid(dem: &Grid, transform: &GeoTransform, crs: Crs) -> Grid {
    let mut g = gradient_grid(dem, transform, crs);
    for s in &mut g.data {
        *s = s.map(|v| 100.0 * v);
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{RasterLayer, Resampling};
    use approx::assert_relative_eq;

    const RES: f64 = 0.001;

    /// 5 × 5 WGS84 DEM dropping southward at `percent` slope.
    fn ramp(percent: f64) -> RasterLayer {
        let step = percent / 100.0 * RES * METRES_PER_DEGREE;
        let data = (0..25).map(|i| 500.0 - (i / 5) as f64 * step).collect();
        RasterLayer::new("dem", data, 5, 5, GeoTransform::new(8.0, 47.0, RES, -RES), Crs::WGS84, Some(-9999.0))
            .unwrap()
    }

    fn at(row: usize, col: usize) -> Point {
        Point::new("p", 8.0 + (col as f64 + 0.5) * RES, 47.0 - (row as f64 + 0.5) * RES)
    }

    #[test]
    fn north_south_ramp_gives_exact_percent() {
        let layer = ramp(2.0);
        let view = layer.view(Resampling::Bilinear).unwrap();
        let s = slope_percent_3x3(&view, &[at(2, 2), at(1, 3)]);
        assert_relative_eq!(s[0].value().unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(s[1].value().unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn edge_points_are_missing() {
        let layer = ramp(2.0);
        let view = layer.view(Resampling::Bilinear).unwrap();
        let s = slope_percent_3x3(&view, &[at(0, 2), at(2, 0), at(4, 2), at(2, 4)]);
        assert!(s.iter().all(|v| v.is_missing()));
    }

    #[test]
    fn any_nodata_in_window_is_missing() {
        let mut layer = ramp(2.0);
        layer.data[5 + 1] = -9999.0; // (1, 1), a corner of the window at (2, 2)
        let view = layer.view(Resampling::Bilinear).unwrap();
        let s = slope_percent_3x3(&view, &[at(2, 2), at(3, 3)]);
        assert!(s[0].is_missing());
        assert!(s[1].value().is_some());
    }

    #[test]
    fn flat_dem_has_zero_slope() {
        let layer = RasterLayer::new(
            "dem",
            vec![100.0; 9],
            3,
            3,
            GeoTransform::new(0.0, 45.0, RES, -RES),
            Crs::WGS84,
            None,
        )
        .unwrap();
        let view = layer.view(Resampling::Bilinear).unwrap();
        let s = slope_percent_3x3(&view, &[Point::new("c", 1.5 * RES, 45.0 - 1.5 * RES)]);
        assert_eq!(s[0], Sample::Value(0.0));
    }

    #[test]
    fn grid_slope_matches_point_estimate_inside() {
        let layer = ramp(5.0);
        let grid = layer.to_grid();
        let pct = slope_percent_grid(&grid, &layer.transform, layer.crs);
        assert_relative_eq!(pct.get(2, 2).value().unwrap(), 5.0, epsilon = 1e-9);
        // Edges and corners use one-sided differences and keep the full slope.
        for (r, c) in [(0, 2), (4, 2), (2, 0), (0, 0), (4, 4)] {
            assert_relative_eq!(pct.get(r, c).value().unwrap(), 5.0, epsilon = 1e-9);
        }
        let deg = slope_degrees_grid(&grid, &layer.transform, layer.crs);
        assert_relative_eq!(deg.get(2, 2).value().unwrap(), 0.05f64.atan().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn projected_grid_uses_metre_cells() {
        // 10 m cells, 1 m rise per column eastward.
        let dem = Grid::from_raw(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0], 3, 3, None).unwrap();
        let gt = GeoTransform::new(500_000.0, 5_000_000.0, 10.0, -10.0);
        let pct = slope_percent_grid(&dem, &gt, Crs::from_epsg(32632));
        assert_relative_eq!(pct.get(1, 1).value().unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn provenance_serializes_as_flag_text() {
        assert_eq!(serde_json::to_string(&SlopeProvenance::Approximate).unwrap(), "\"approx\"");
        assert_eq!(SlopeProvenance::Precomputed.as_str(), "precomputed");
    }
}
