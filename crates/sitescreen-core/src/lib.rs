//! Geospatial site screening: sample terrain, soil and land-cover layers at
//! asset locations and derive classified nature-risk indicators.
pub mod analysis;
pub mod classify;
pub mod config;
pub mod crs;
pub mod error;
pub mod grid;
pub mod indicators;
pub mod landcover;
pub mod pipeline;
pub mod points;
pub mod raster;
pub mod sample;
pub mod sampler;
pub mod slope;
pub mod vector;

pub use analysis::{run_analysis, SiteRecord};
pub use classify::{RechargeClass, RechargeThresholds, ThresholdTable};
pub use config::{ScoringConfig, SiteLayers};
pub use crs::{CoordTransformer, Crs};
pub use error::{Error, Result, Stage};
pub use grid::Grid;
pub use pipeline::{load_site_grids, run_pipeline, PipelineKind, PipelineOutput};
pub use raster::{GeoTransform, RasterLayer, Resampling, SamplingView};
pub use sample::Sample;
pub use sampler::Point;
