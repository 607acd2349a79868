//! Error taxonomy for the screening core.
//!
//! Configuration and I/O problems are hard failures. Data-quality conditions
//! (nodata, out-of-bounds points, edge pixels) never reach this type; they are
//! resolved to [`Sample::Missing`](crate::sample::Sample) at the sampling
//! boundary instead.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Logical pipeline stage or layer name attached to a failure so a caller can
/// tell which input broke a multi-layer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// DEM elevation + slope sampling (or the precomputed slope layer).
    DemSlopeElev,
    /// Water-capacity sampling.
    AwcSample,
    /// Land-cover sampling, raster or vector.
    Clc,
    Dem,
    Awc,
    Slope,
    FlowAcc,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DemSlopeElev => "dem_slope_elev",
            Stage::AwcSample => "awc_sample",
            Stage::Clc => "clc",
            Stage::Dem => "dem",
            Stage::Awc => "awc",
            Stage::Slope => "slope",
            Stage::FlowAcc => "flow_acc",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: source has no CRS")]
    MissingCrs { path: String },

    #[error("{path}: no usable georeferencing tags")]
    MissingGeoTransform { path: String },

    #[error("unsupported CRS EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("coordinate transform failed: {0}")]
    Transform(String),

    #[error("unsupported pixel type: {0}")]
    UnsupportedDataType(String),

    #[error("invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("grid '{layer}' is {width}x{height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        layer: String,
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("missing required layer path '{0}'")]
    MissingLayer(&'static str),

    #[error("{path}: cannot find a land-cover code field (tried {tried})")]
    NoCodeField { path: String, tried: String },

    #[error("invalid threshold table '{name}': {reason}")]
    InvalidThresholds { name: String, reason: String },

    #[error("invalid points document: {0}")]
    InvalidPoints(String),

    #[error("[stage:{stage}] {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag this error with a stage. An already tagged error keeps its
    /// innermost tag so the first failing layer is what gets reported.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            tagged @ Error::Stage { .. } => tagged,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// True for configuration problems (bad paths in the site document,
    /// unrecognised code fields, malformed thresholds), as opposed to I/O.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::MissingLayer(_)
            | Error::NoCodeField { .. }
            | Error::InvalidThresholds { .. }
            | Error::InvalidPoints(_)
            | Error::UnsupportedCrs(_) => true,
            Error::Stage { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a [`Stage`] to the error side of a result.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.at_stage(stage))
    }
}
