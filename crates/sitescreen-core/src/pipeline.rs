//! Whole-raster screening pipelines.
//!
//! Every input grid is read on the DEM's pixel grid; indicators are computed
//! cell by cell, classified against the scoring tables and optionally sampled
//! at asset points.
//!
//! | kind   | indicators                                   | extras                    |
//! |--------|----------------------------------------------|---------------------------|
//! | `tnfd` | runoff, flood, erosion, recharge, fragmentation | site score, asset scores |
//! | `es4`  | slope, runoff, flood, erosion                | receptor scores           |
//! | `sbtn` | recharge, fragmentation, erosion             | natural fraction          |

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{aggregate, classify, SiteScore};
use crate::config::{ScoringConfig, SiteLayers};
use crate::crs::CoordTransformer;
use crate::error::{Error, Result, Stage, StageExt};
use crate::grid::Grid;
use crate::indicators::erosion::{erosion_potential, ErosionParams};
use crate::indicators::fragmentation::{fragmentation_index, natural_fraction, DEFAULT_WINDOW};
use crate::indicators::hydrology::{flood_susceptibility, runoff_coefficient, FloodParams, RunoffParams};
use crate::indicators::recharge::{recharge_index, RechargeParams};
use crate::indicators::soil_erodibility::{normalised_k_maps, uncertainty_widths, KFactorLayers};
use crate::raster::{open_layer, RasterLayer};
use crate::sample::Sample;
use crate::sampler::Point;
use crate::slope::slope_degrees_grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Tnfd,
    Es4,
    Sbtn,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Tnfd => "tnfd",
            PipelineKind::Es4 => "es4",
            PipelineKind::Sbtn => "sbtn",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable parameters of every indicator, defaulting to the screening values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub recharge: RechargeParams,
    pub runoff: RunoffParams,
    pub flood: FloodParams,
    pub erosion: ErosionParams,
    pub fragmentation_window: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            recharge: RechargeParams::default(),
            runoff: RunoffParams::default(),
            flood: FloodParams::default(),
            erosion: ErosionParams::default(),
            fragmentation_window: DEFAULT_WINDOW,
        }
    }
}

/// Site layers read onto the DEM grid.
#[derive(Debug, Clone)]
pub struct SiteGrids {
    /// Reference geometry (transform, CRS, shape) and elevations.
    pub dem: RasterLayer,
    pub slope_deg: Grid,
    pub awc_mm: Grid,
    pub land_cover: Grid,
    pub flow_acc: Option<Grid>,
    pub k_factors: KFactorLayers,
}

fn check_shape(layer: &RasterLayer, dem: &RasterLayer) -> Result<()> {
    if layer.width != dem.width || layer.height != dem.height {
        return Err(Error::ShapeMismatch {
            layer: layer.name.clone(),
            width: layer.width,
            height: layer.height,
            expected_width: dem.width,
            expected_height: dem.height,
        });
    }
    Ok(())
}

fn open_aligned(path: &Path, name: &str, stage: Stage, dem: &RasterLayer) -> Result<Grid> {
    let layer = open_layer(path, name, stage)?;
    check_shape(&layer, dem).stage(stage)?;
    Ok(layer.to_grid())
}

/// K-factor layers are optional extras: unreadable ones are skipped.
fn open_optional(path: Option<&Path>, name: &str, dem: &RasterLayer) -> Option<Grid> {
    let path = path?;
    let loaded = RasterLayer::open(path, name).and_then(|l| check_shape(&l, dem).map(|_| l.to_grid()));
    match loaded {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(layer = name, path = %path.display(), error = %e, "skipping optional layer");
            None
        }
    }
}

/// Read the site layers. A precomputed slope layer (percent) replaces the
/// DEM-derived slope.
pub fn load_site_grids(layers: &SiteLayers) -> Result<SiteGrids> {
    let dem = open_layer(layers.require("dem").stage(Stage::Dem)?, "dem", Stage::Dem)?;

    let slope_deg = match layers.slope.as_deref() {
        Some(path) => {
            let mut g = open_aligned(path, "slope", Stage::Slope, &dem)?;
            for s in &mut g.data {
                *s = s.map(|pct| (pct / 100.0).atan().to_degrees());
            }
            g
        }
        None => slope_degrees_grid(&dem.to_grid(), &dem.transform, dem.crs),
    };

    let awc_mm = open_aligned(layers.require("awc").stage(Stage::Awc)?, "awc", Stage::Awc, &dem)?;

    let clc = layers.require("clc").stage(Stage::Clc)?;
    let is_tiff = clc
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
    if !is_tiff {
        return Err(Error::UnsupportedDataType(format!(
            "{}: raster pipelines need a GeoTIFF land-cover layer",
            clc.display()
        ))
        .at_stage(Stage::Clc));
    }
    let land_cover = open_aligned(clc, "clc", Stage::Clc, &dem)?;

    let flow_acc = match layers.flow_acc.as_deref() {
        Some(path) => Some(open_aligned(path, "flow_acc", Stage::FlowAcc, &dem)?),
        None => None,
    };

    let k_factors = KFactorLayers {
        k_ksat: open_optional(layers.k_ksat.as_deref(), "k_ksat", &dem),
        k_wischmeier: open_optional(layers.k_wischmeier.as_deref(), "k_wischmeier", &dem),
        k_glosem: open_optional(layers.k_glosem.as_deref(), "k_glosem", &dem),
        k_ksat_error: open_optional(layers.k_ksat_error.as_deref(), "k_ksat_error", &dem),
        k_wischmeier_error: open_optional(layers.k_wischmeier_error.as_deref(), "k_wischmeier_error", &dem),
    };

    debug!(
        width = dem.width,
        height = dem.height,
        crs = %dem.crs,
        flow_acc = flow_acc.is_some(),
        "loaded site grids"
    );
    Ok(SiteGrids {
        dem,
        slope_deg,
        awc_mm,
        land_cover,
        flow_acc,
        k_factors,
    })
}

/// Indicator values and classes sampled at one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetScore {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    /// `<indicator>` → value at the asset.
    #[serde(flatten)]
    pub values: BTreeMap<String, Sample>,
    /// `<indicator>_class` → class at the asset, for scored indicators.
    #[serde(flatten)]
    pub classes: BTreeMap<String, u16>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub kind: PipelineKind,
    pub indicators: BTreeMap<String, Grid>,
    pub classified: BTreeMap<String, Vec<u16>>,
    pub site_score: Option<SiteScore>,
    pub natural_fraction: Option<f64>,
    pub asset_scores: Vec<AssetScore>,
    pub k_factors: BTreeMap<String, Grid>,
    pub k_uncertainty: BTreeMap<String, f64>,
}

fn to_grid(data: Vec<Sample>, like: &Grid) -> Grid {
    Grid {
        data,
        width: like.width,
        height: like.height,
    }
}

/// Compute the indicator grids of one pipeline.
pub fn compute_indicators(kind: PipelineKind, grids: &SiteGrids, params: &IndicatorParams) -> BTreeMap<String, Grid> {
    let like = &grids.land_cover;
    let (slope, awc, lc) = (&grids.slope_deg.data[..], &grids.awc_mm.data[..], &grids.land_cover.data[..]);

    let mut out = BTreeMap::new();
    let erosion = to_grid(erosion_potential(slope, awc, lc, &params.erosion), like);

    if matches!(kind, PipelineKind::Tnfd | PipelineKind::Es4) {
        let runoff = runoff_coefficient(slope, awc, lc, &params.runoff);
        let flow = grids.flow_acc.as_ref().map(|g| &g.data[..]);
        let flood = flood_susceptibility(&runoff, flow, &params.flood);
        out.insert("runoff".to_string(), to_grid(runoff, like));
        out.insert("flood".to_string(), to_grid(flood, like));
    }
    if matches!(kind, PipelineKind::Tnfd | PipelineKind::Sbtn) {
        out.insert("recharge".to_string(), to_grid(recharge_index(awc, lc, &params.recharge), like));
        out.insert(
            "fragmentation".to_string(),
            fragmentation_index(&grids.land_cover, params.fragmentation_window),
        );
    }
    if kind == PipelineKind::Es4 {
        out.insert("slope".to_string(), grids.slope_deg.clone());
    }
    out.insert("erosion".to_string(), erosion);
    out
}

/// Sample indicator grids at WGS84 points and classify where a table exists.
pub fn score_assets(
    indicators: &BTreeMap<String, Grid>,
    dem: &RasterLayer,
    scoring: &ScoringConfig,
    points: &[Point],
) -> Result<Vec<AssetScore>> {
    let to_native = CoordTransformer::from_wgs84(dem.crs)?;
    points
        .iter()
        .map(|p| {
            let cell = to_native
                .transform(p.lon, p.lat)
                .ok()
                .and_then(|(x, y)| dem.transform.index(x, y, dem.width, dem.height));
            let mut values = BTreeMap::new();
            let mut classes = BTreeMap::new();
            for (name, grid) in indicators {
                let v = cell.map_or(Sample::Missing, |(r, c)| grid.get(r, c));
                if let Some(table) = scoring.indicators.get(name) {
                    classes.insert(format!("{name}_class"), table.class_of(v));
                }
                values.insert(name.clone(), v);
            }
            Ok(AssetScore {
                id: p.id.clone(),
                longitude: p.lon,
                latitude: p.lat,
                values,
                classes,
            })
        })
        .collect()
}

/// Run one pipeline over loaded site grids.
pub fn run_pipeline(
    kind: PipelineKind,
    grids: &SiteGrids,
    scoring: &ScoringConfig,
    points: &[Point],
    params: &IndicatorParams,
) -> Result<PipelineOutput> {
    let indicators = compute_indicators(kind, grids, params);

    let classified: BTreeMap<String, Vec<u16>> = indicators
        .iter()
        .filter_map(|(name, grid)| {
            let table = scoring.indicators.get(name)?;
            Some((name.clone(), classify(&grid.data, table)))
        })
        .collect();

    let site_score = (kind == PipelineKind::Tnfd).then(|| aggregate(&classified, scoring.weights.as_ref()));
    let natural_fraction = match kind {
        PipelineKind::Sbtn => natural_fraction(&grids.land_cover),
        _ => None,
    };
    let asset_scores = if kind != PipelineKind::Sbtn && !points.is_empty() {
        score_assets(&indicators, &grids.dem, scoring, points)?
    } else {
        Vec::new()
    };

    let (k_factors, k_uncertainty) = if grids.k_factors.is_empty() {
        (BTreeMap::new(), BTreeMap::new())
    } else {
        let maps: BTreeMap<String, Grid> = normalised_k_maps(&grids.k_factors)
            .into_iter()
            .map(|(k, g)| (k.to_string(), g))
            .collect();
        let widths: BTreeMap<String, f64> = uncertainty_widths(&grids.k_factors)
            .into_iter()
            .map(|(k, w)| (k.to_string(), w))
            .collect();
        debug!(maps = maps.len(), widths = widths.len(), "soil erodibility layers");
        (maps, widths)
    };

    info!(
        pipeline = %kind,
        indicators = indicators.len(),
        classified = classified.len(),
        assets = asset_scores.len(),
        composite = ?site_score.as_ref().and_then(|s| s.composite),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        kind,
        indicators,
        classified,
        site_score,
        natural_fraction,
        asset_scores,
        k_factors,
        k_uncertainty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ThresholdTable;
    use crate::crs::Crs;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn grids(lc_code: f64) -> SiteGrids {
        let gt = GeoTransform::new(10.0, 46.0, 0.001, -0.001);
        let dem = RasterLayer::new("dem", (0..16).map(|i| f64::from(i / 4) * -2.0 + 500.0).collect(), 4, 4, gt, Crs::WGS84, None)
            .unwrap();
        let slope_deg = slope_degrees_grid(&dem.to_grid(), &dem.transform, dem.crs);
        SiteGrids {
            slope_deg,
            awc_mm: Grid::from_raw(&(0..16).map(|i| 100.0 + f64::from(i)).collect::<Vec<_>>(), 4, 4, None).unwrap(),
            land_cover: Grid::from_raw(&[lc_code; 16], 4, 4, None).unwrap(),
            flow_acc: None,
            k_factors: KFactorLayers::default(),
            dem,
        }
    }

    fn scoring() -> ScoringConfig {
        let table = |name: &str| {
            ThresholdTable::new(name, vec![0.33, 0.66], vec!["low".into(), "medium".into(), "high".into()]).unwrap()
        };
        let mut s = ScoringConfig::default();
        for name in ["runoff", "erosion", "recharge", "fragmentation"] {
            s.indicators.insert(name.to_string(), table(name));
        }
        s
    }

    #[test]
    fn indicator_sets_per_pipeline() {
        let g = grids(311.0);
        let p = IndicatorParams::default();
        let names = |k| compute_indicators(k, &g, &p).into_keys().collect::<Vec<_>>();
        assert_eq!(names(PipelineKind::Tnfd), ["erosion", "flood", "fragmentation", "recharge", "runoff"]);
        assert_eq!(names(PipelineKind::Es4), ["erosion", "flood", "runoff", "slope"]);
        assert_eq!(names(PipelineKind::Sbtn), ["erosion", "fragmentation", "recharge"]);
    }

    #[test]
    fn tnfd_scores_site_and_assets() {
        let g = grids(311.0);
        let points = [Point::new("A1", 10.0015, 45.9985), Point::new("far", 20.0, 45.0)];
        let out = run_pipeline(PipelineKind::Tnfd, &g, &scoring(), &points, &IndicatorParams::default()).unwrap();

        let score = out.site_score.unwrap();
        assert!(score.composite.is_some());
        assert!(!score.mean_class.contains_key("flood"));
        assert_eq!(out.classified.len(), 4);

        let a1 = &out.asset_scores[0];
        assert_relative_eq!(a1.values["fragmentation"].value().unwrap(), 1.0);
        assert_eq!(a1.classes["fragmentation_class"], 3);
        assert!(!a1.classes.contains_key("flood_class"));
        let far = &out.asset_scores[1];
        assert!(far.values["runoff"].is_missing());
        assert_eq!(far.classes["runoff_class"], 0);
    }

    #[test]
    fn sbtn_reports_natural_fraction_without_assets() {
        let g = grids(112.0);
        let out = run_pipeline(PipelineKind::Sbtn, &g, &scoring(), &[Point::new("a", 10.001, 45.999)], &IndicatorParams::default())
            .unwrap();
        assert_eq!(out.natural_fraction, Some(0.0));
        assert!(out.asset_scores.is_empty());
        assert!(out.site_score.is_none());
    }

    #[test]
    fn soil_erodibility_layers_are_reported_when_present() {
        let mut g = grids(311.0);
        let p = IndicatorParams::default();
        let out = run_pipeline(PipelineKind::Es4, &g, &scoring(), &[], &p).unwrap();
        assert!(out.k_factors.is_empty() && out.k_uncertainty.is_empty());

        g.k_factors.k_glosem = Some(Grid::from_raw(&[0.02; 16], 4, 4, None).unwrap());
        g.k_factors.k_ksat_error = Some(Grid::from_raw(&[0.01; 16], 4, 4, None).unwrap());
        let out = run_pipeline(PipelineKind::Es4, &g, &scoring(), &[], &p).unwrap();
        assert_eq!(out.k_factors["k_glosem"].get(0, 0), Sample::Value(0.5));
        assert_relative_eq!(out.k_uncertainty["k_ksat_error"], 0.0);
    }

    #[test]
    fn shape_mismatch_names_the_layer() {
        let g = grids(311.0);
        let small = RasterLayer::new("awc", vec![1.0; 4], 2, 2, g.dem.transform, Crs::WGS84, None).unwrap();
        let err = check_shape(&small, &g.dem).unwrap_err();
        assert!(err.to_string().contains("'awc' is 2x2, expected 4x4"));
    }

    #[test]
    fn missing_required_layer_is_stage_tagged() {
        let err = load_site_grids(&SiteLayers::default()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Dem));
    }

    #[test]
    fn asset_scores_serialize_flat_columns() {
        let mut values = BTreeMap::new();
        values.insert("runoff".to_string(), Sample::Value(0.5));
        let mut classes = BTreeMap::new();
        classes.insert("runoff_class".to_string(), 2u16);
        let a = AssetScore {
            id: "A1".into(),
            longitude: 1.0,
            latitude: 2.0,
            values,
            classes,
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["runoff"], 0.5);
        assert_eq!(json["runoff_class"], 2);
    }
}
