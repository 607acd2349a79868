//! WGS84 sampling views over a raster layer.
//!
//! A view exposes a pixel grid in the analysis CRS. When the layer is already
//! in EPSG:4326 the grid is the layer's own; otherwise the view builds a
//! virtual north-up grid over the transformed bounds and resamples each
//! virtual cell from the source on demand.

use tracing::debug;

use crate::crs::CoordTransformer;
use crate::error::Result;
use crate::raster::geotransform::GeoTransform;
use crate::raster::layer::RasterLayer;
use crate::sample::Sample;

/// How a warped view derives a virtual cell from the source grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    /// Source cell containing the virtual cell centre. Required for
    /// categorical layers so no class codes are invented.
    #[default]
    Nearest,
    /// Distance-weighted blend of the four surrounding source cells, for
    /// continuous fields.
    Bilinear,
}

/// Borrowed view of a [`RasterLayer`] in the WGS84 analysis frame.
#[derive(Debug)]
pub struct SamplingView<'a> {
    layer: &'a RasterLayer,
    resampling: Resampling,
    transform: GeoTransform,
    width: usize,
    height: usize,
    /// WGS84 → native CRS, present only for warped views.
    to_source: Option<CoordTransformer>,
}

impl<'a> SamplingView<'a> {
    pub fn new(layer: &'a RasterLayer, resampling: Resampling) -> Result<Self> {
        if layer.crs.is_wgs84() {
            return Ok(Self {
                layer,
                resampling,
                transform: layer.transform,
                width: layer.width,
                height: layer.height,
                to_source: None,
            });
        }

        let to_wgs84 = CoordTransformer::to_wgs84(layer.crs)?;
        let (min_x, min_y, max_x, max_y) = to_wgs84.transform_bounds(layer.bounds())?;

        // Square pixels that keep the source's pixel count along the diagonal.
        let (dx, dy) = (max_x - min_x, max_y - min_y);
        let diag_px = ((layer.width * layer.width + layer.height * layer.height) as f64).sqrt();
        let res = (dx * dx + dy * dy).sqrt() / diag_px;
        let width = ((dx / res).ceil() as usize).max(1);
        let height = ((dy / res).ceil() as usize).max(1);

        debug!(
            layer = %layer.name,
            from = %layer.crs,
            width,
            height,
            res_deg = res,
            ?resampling,
            "warping raster to EPSG:4326"
        );

        Ok(Self {
            layer,
            resampling,
            transform: GeoTransform::new(min_x, max_y, res, -res),
            width,
            height,
            to_source: Some(CoordTransformer::from_wgs84(layer.crs)?),
        })
    }

    /// Native nodata sentinel of the underlying layer.
    pub fn nodata(&self) -> Option<f64> {
        self.layer.nodata
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_warped(&self) -> bool {
        self.to_source.is_some()
    }

    /// View pixel `(row, col)` containing a WGS84 coordinate.
    pub fn index(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        self.transform.index(lon, lat, self.width, self.height)
    }

    /// Value of view pixel `(row, col)`; missing outside the view grid.
    pub fn cell(&self, row: usize, col: usize) -> Sample {
        if row >= self.height || col >= self.width {
            return Sample::Missing;
        }
        let Some(to_source) = &self.to_source else {
            return self.layer.cell(row, col);
        };
        let (lon, lat) = self.transform.pixel_center(row, col);
        let Ok((x, y)) = to_source.transform(lon, lat) else {
            return Sample::Missing;
        };
        let (col_f, row_f) = self.layer.transform.geo_to_pixel(x, y);
        if !col_f.is_finite() || !row_f.is_finite() {
            return Sample::Missing;
        }
        match self.resampling {
            Resampling::Nearest => self.layer.cell_checked(row_f.floor() as i64, col_f.floor() as i64),
            Resampling::Bilinear => bilinear(self.layer, col_f, row_f),
        }
    }

    /// Value of the view pixel containing a WGS84 coordinate.
    pub fn sample_at(&self, lon: f64, lat: f64) -> Sample {
        match self.index(lon, lat) {
            Some((row, col)) => self.cell(row, col),
            None => Sample::Missing,
        }
    }
}

/// Bilinear blend at fractional source pixel `(col_f, row_f)`.
///
/// Missing when the containing source cell is missing. Otherwise missing
/// neighbours are dropped and the remaining weights renormalised.
fn bilinear(layer: &RasterLayer, col_f: f64, row_f: f64) -> Sample {
    let center = layer.cell_checked(row_f.floor() as i64, col_f.floor() as i64);
    let Some(center_value) = center.value() else {
        return Sample::Missing;
    };

    let x = col_f - 0.5;
    let y = row_f - 0.5;
    let (x0, y0) = (x.floor(), y.floor());
    let (tx, ty) = (x - x0, y - y0);
    let (c0, r0) = (x0 as i64, y0 as i64);

    let taps = [
        (r0, c0, (1.0 - tx) * (1.0 - ty)),
        (r0, c0 + 1, tx * (1.0 - ty)),
        (r0 + 1, c0, (1.0 - tx) * ty),
        (r0 + 1, c0 + 1, tx * ty),
    ];
    let mut sum = 0.0;
    let mut weight = 0.0;
    for (r, c, w) in taps {
        if w <= 0.0 {
            continue;
        }
        if let Some(v) = layer.cell_checked(r, c).value() {
            sum += w * v;
            weight += w;
        }
    }
    if weight <= 0.0 {
        Sample::Value(center_value)
    } else {
        Sample::finite(sum / weight)
    }
}
