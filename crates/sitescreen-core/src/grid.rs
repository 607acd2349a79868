use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sample::{mask_band, Sample};

/// A 2D grid of samples, row-major, row 0 = northernmost row.
///
/// Used for whole-raster indicator computation. Geographic placement lives
/// with the layer the grid was read from, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub data: Vec<Sample>,
    pub width: usize,
    pub height: usize,
}

impl Grid {
    /// Create a grid filled with the given sample.
    pub fn new(width: usize, height: usize, fill: Sample) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
        }
    }

    /// All-missing grid of the given shape.
    pub fn missing(width: usize, height: usize) -> Self {
        Self::new(width, height, Sample::Missing)
    }

    pub fn from_samples(data: Vec<Sample>, width: usize, height: usize) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(Self { data, width, height })
    }

    /// Build from a raw band, masking `nodata` and non-finite cells.
    pub fn from_raw(raw: &[f64], width: usize, height: usize, nodata: Option<f64>) -> Result<Self> {
        Self::from_samples(mask_band(raw, nodata), width, height)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Sample {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: Sample) {
        self.data[row * self.width + col] = val;
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|s| !s.is_missing()).count()
    }

    /// Raw values with missing cells written as `nodata`.
    pub fn to_raw(&self, nodata: f64) -> Vec<f64> {
        self.data.iter().map(|s| s.or_nodata(nodata)).collect()
    }

    /// Minimum and maximum over valid cells, `None` when all are missing.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.data.iter().filter_map(|s| s.value()).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}
