//! Point analysis: sample every site layer at each point and assemble one
//! screening record per point.
//!
//! Three stages run in order, each tagged so a failure names its input:
//! `dem_slope_elev` (elevation plus slope, or the precomputed slope layer),
//! `awc_sample` (water capacity) and `clc` (land cover, raster or polygons).

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::classify::{
    awc_category, classify_recharge, recharge_confidence, AwcCategory, Confidence, RechargeClass, RechargeThresholds,
};
use crate::config::SiteLayers;
use crate::error::{Error, Result, Stage, StageExt};
use crate::landcover;
use crate::points::PointRecord;
use crate::raster::{RasterLayer, Resampling};
use crate::sample::Sample;
use crate::sampler::{sample, Point};
use crate::slope::{slope_percent_3x3, SlopeProvenance};
use crate::vector::assign_zone;

/// One output row. Missing samples serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_use_m3y: Option<f64>,
    pub elevation_m: Sample,
    pub slope_percent: Sample,
    pub awc_mm: Sample,
    pub land_cover_code: Option<i64>,
    pub land_cover_name: String,
    pub near_water: bool,
    pub near_wetland: bool,
    pub recharge_class: RechargeClass,
    pub awc_category: AwcCategory,
    pub recharge_confidence: Confidence,
    pub slope_quality_flag: SlopeProvenance,
    pub water_stress_flag: bool,
    pub dem_nodata_flag: bool,
    pub awc_nodata_flag: bool,
}

/// Columns sampled for every point, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledColumns {
    pub elevation_m: Vec<Sample>,
    pub slope_percent: Vec<Sample>,
    pub slope_provenance: SlopeProvenance,
    pub awc_mm: Vec<Sample>,
    pub land_cover: Vec<Sample>,
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

fn dem_stage(points: &[Point], dem: &Path, slope: Option<&Path>) -> Result<(Vec<Sample>, Vec<Sample>)> {
    let layer = RasterLayer::open(dem, "dem")?;
    let view = layer.view(Resampling::Bilinear)?;
    let elevations = sample(&view, points);
    let slopes = match slope {
        Some(path) => {
            let slope_layer = RasterLayer::open(path, "slope")?;
            sample(&slope_layer.view(Resampling::Bilinear)?, points)
        }
        None => slope_percent_3x3(&view, points),
    };
    Ok((elevations, slopes))
}

fn awc_stage(points: &[Point], awc: Option<&Path>) -> Result<Vec<Sample>> {
    match awc {
        Some(path) => {
            let layer = RasterLayer::open(path, "awc")?;
            Ok(sample(&layer.view(Resampling::Bilinear)?, points))
        }
        None => Ok(vec![Sample::Missing; points.len()]),
    }
}

fn clc_stage(points: &[Point], clc: &Path) -> Result<Vec<Sample>> {
    if is_raster(clc) {
        let layer = RasterLayer::open(clc, "clc")?;
        Ok(sample(&layer.view(Resampling::Nearest)?, points))
    } else {
        assign_zone(points, clc)
    }
}

/// Sample every layer at the points. File handles are released inside each
/// stage, before the next one starts.
pub fn sample_layers(points: &[Point], layers: &SiteLayers) -> Result<SampledColumns> {
    let dem = layers.require("dem").stage(Stage::DemSlopeElev)?;
    let clc = layers.require("clc").stage(Stage::Clc)?;

    let (elevation_m, slope_percent) = dem_stage(points, dem, layers.slope.as_deref()).stage(Stage::DemSlopeElev)?;
    let slope_provenance = if layers.slope.is_some() {
        SlopeProvenance::Precomputed
    } else {
        SlopeProvenance::Approximate
    };
    debug!(n = points.len(), slope = slope_provenance.as_str(), "sampled elevation and slope");

    let awc_mm = awc_stage(points, layers.awc.as_deref()).stage(Stage::AwcSample)?;
    debug!(n = points.len(), "sampled water capacity");

    let land_cover = clc_stage(points, clc).stage(Stage::Clc)?;
    debug!(n = points.len(), raster = is_raster(clc), "sampled land cover");

    Ok(SampledColumns {
        elevation_m,
        slope_percent,
        slope_provenance,
        awc_mm,
        land_cover,
    })
}

/// Combine sampled columns into records, row `i` for `records[i]`.
pub fn assemble(records: &[PointRecord], cols: &SampledColumns, thresholds: &RechargeThresholds) -> Result<Vec<SiteRecord>> {
    let n = records.len();
    for len in [cols.elevation_m.len(), cols.slope_percent.len(), cols.awc_mm.len(), cols.land_cover.len()] {
        if len != n {
            return Err(Error::InvalidPoints(format!("sampled {len} values for {n} points")));
        }
    }

    Ok(records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let (elev, slope, awc) = (cols.elevation_m[i], cols.slope_percent[i], cols.awc_mm[i]);
            let lc = landcover::decode(cols.land_cover[i]);
            let recharge_class = classify_recharge(awc, slope, thresholds);
            SiteRecord {
                id: rec.point.id.clone(),
                latitude: rec.point.lat,
                longitude: rec.point.lon,
                water_use_m3y: rec.water_use_m3y,
                elevation_m: elev,
                slope_percent: slope,
                awc_mm: awc,
                land_cover_code: lc.code,
                land_cover_name: lc.name.to_string(),
                near_water: lc.near_water,
                near_wetland: lc.near_wetland,
                recharge_class,
                awc_category: awc_category(awc, thresholds),
                recharge_confidence: recharge_confidence(awc, slope, thresholds),
                slope_quality_flag: cols.slope_provenance,
                water_stress_flag: recharge_class == RechargeClass::Low && rec.water_use_m3y.unwrap_or(0.0) > 0.0,
                dem_nodata_flag: elev.is_missing(),
                awc_nodata_flag: awc.is_missing(),
            }
        })
        .collect())
}

/// Run the full point analysis.
pub fn run_analysis(
    records: &[PointRecord],
    layers: &SiteLayers,
    thresholds: &RechargeThresholds,
) -> Result<Vec<SiteRecord>> {
    let points: Vec<Point> = records.iter().map(|r| r.point.clone()).collect();
    let cols = sample_layers(&points, layers)?;
    let rows = assemble(records, &cols, thresholds)?;
    info!(
        points = rows.len(),
        dem_nodata = rows.iter().filter(|r| r.dem_nodata_flag).count(),
        awc_nodata = rows.iter().filter(|r| r.awc_nodata_flag).count(),
        "point analysis complete"
    );
    Ok(rows)
}
