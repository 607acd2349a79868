//! Raster reader adapter: GeoTIFF I/O, georeferencing and WGS84 sampling views.

pub mod geotiff;
pub mod geotransform;
pub mod layer;
pub mod view;

use std::path::Path;

use serde::Serialize;

use crate::crs::CoordTransformer;
use crate::error::{Result, Stage, StageExt};
use crate::grid::Grid;
use crate::sampler::Point;

pub use geotiff::{read_geotiff, write_geotiff};
pub use geotransform::GeoTransform;
pub use layer::RasterLayer;
pub use view::{Resampling, SamplingView};

/// Open a raster for one sampling operation.
///
/// The returned layer owns its cells; no file handle outlives this call.
/// Errors carry `stage` so callers can tell which input failed.
pub fn open_layer(path: impl AsRef<Path>, name: &str, stage: Stage) -> Result<RasterLayer> {
    RasterLayer::open(path, name).stage(stage)
}

/// Write a grid with the georeferencing of `like` (same shape assumed).
pub fn write_grid(path: &Path, grid: &Grid, like: &RasterLayer, nodata: f64) -> Result<()> {
    write_geotiff(
        path,
        &grid.to_raw(nodata),
        grid.width,
        grid.height,
        &like.transform,
        like.crs,
        Some(nodata),
    )
}

/// Bounds-only preflight: how many points fall inside a layer's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub n_total: usize,
    pub n_inside_bounds: usize,
}

pub fn coverage_report(layer: &RasterLayer, points: &[Point]) -> Result<CoverageReport> {
    let to_native = CoordTransformer::from_wgs84(layer.crs)?;
    let (x0, y0, x1, y1) = layer.bounds();
    let n_inside_bounds = points
        .iter()
        .filter_map(|p| to_native.transform(p.lon, p.lat).ok())
        .filter(|&(x, y)| x >= x0 && x <= x1 && y >= y0 && y <= y1)
        .count();
    Ok(CoverageReport {
        n_total: points.len(),
        n_inside_bounds,
    })
}
