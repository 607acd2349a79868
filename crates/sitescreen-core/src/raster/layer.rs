use std::path::Path;

use tracing::debug;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::raster::geotiff::read_geotiff;
use crate::raster::geotransform::GeoTransform;
use crate::raster::view::{Resampling, SamplingView};
use crate::sample::Sample;

/// A single-band raster held in memory: cell values, CRS, geotransform and
/// the declared nodata sentinel. Immutable once opened.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    /// Logical layer name (`dem`, `awc`, `clc`, ...), used in messages.
    pub name: String,
    /// Row-major cell values, row 0 = top of the raster.
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
}

impl RasterLayer {
    pub fn new(
        name: impl Into<String>,
        data: Vec<f64>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(Self {
            name: name.into(),
            data,
            width,
            height,
            transform,
            crs,
            nodata,
        })
    }

    /// Read a GeoTIFF into memory. The file handle is closed before this
    /// returns, on success and on error alike.
    pub fn open(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = path.as_ref();
        let layer = read_geotiff(path, name)?;
        debug!(
            layer = name,
            path = %path.display(),
            width = layer.width,
            height = layer.height,
            crs = %layer.crs,
            nodata = ?layer.nodata,
            "opened raster"
        );
        Ok(layer)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }

    /// Masked cell value.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Sample {
        Sample::from_raw(self.get(row, col), self.nodata)
    }

    /// Masked cell value with signed indices; out-of-range reads are missing.
    #[inline]
    pub fn cell_checked(&self, row: i64, col: i64) -> Sample {
        if row < 0 || col < 0 || row >= self.height as i64 || col >= self.width as i64 {
            return Sample::Missing;
        }
        self.cell(row as usize, col as usize)
    }

    /// Envelope in the layer's native CRS.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width, self.height)
    }

    /// Masked copy of the band as a [`Grid`].
    pub fn to_grid(&self) -> Grid {
        Grid {
            data: self.data.iter().map(|&v| Sample::from_raw(v, self.nodata)).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Sampling view in the WGS84 analysis frame; warps when the native CRS differs.
    pub fn view(&self, resampling: Resampling) -> Result<SamplingView<'_>> {
        SamplingView::new(self, resampling)
    }
}
