/// Batch screening driver.
///
/// `analyze`: point analysis of every record in a points document.
/// `pipeline`: whole-raster indicator pipeline (tnfd, es4 or sbtn).
/// `coverage`: bounds-only preflight of the points against each raster layer.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sitescreen_core::classify::SiteScore;
use sitescreen_core::config::load_recharge_thresholds;
use sitescreen_core::pipeline::{AssetScore, IndicatorParams};
use sitescreen_core::points::load_points;
use sitescreen_core::raster::{coverage_report, write_grid, CoverageReport};
use sitescreen_core::{
    load_site_grids, run_analysis, run_pipeline, Grid, PipelineKind, Point, RasterLayer, RechargeThresholds,
    ScoringConfig, SiteLayers,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const OUTPUT_NODATA: f64 = -9999.0;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "screen", about = "Screen asset locations against site terrain, soil and land-cover layers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample every layer at each point and classify recharge potential
    Analyze {
        /// Points document (JSON array or GeoJSON FeatureCollection)
        #[arg(short, long)]
        points: PathBuf,

        /// Site layer document
        #[arg(short, long)]
        layers: PathBuf,

        /// Recharge tier document
        #[arg(short, long)]
        thresholds: Option<PathBuf>,

        /// Output JSON file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compute, classify and score indicator grids over the DEM extent
    Pipeline {
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Site layer document
        #[arg(short, long)]
        layers: PathBuf,

        /// Scoring document with per-indicator bins and labels
        #[arg(short, long)]
        scoring: PathBuf,

        /// Asset points to score
        #[arg(short, long)]
        points: Option<PathBuf>,

        /// Indicator parameter overrides (JSON)
        #[arg(long)]
        params: Option<PathBuf>,

        /// Write every indicator grid as `<kind>_<name>.tif` here
        #[arg(long)]
        grids_dir: Option<PathBuf>,

        /// Output JSON file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Count the points inside each raster layer's extent
    Coverage {
        #[arg(short, long)]
        points: PathBuf,

        #[arg(short, long)]
        layers: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Tnfd,
    Es4,
    Sbtn,
}

impl From<Kind> for PipelineKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Tnfd => PipelineKind::Tnfd,
            Kind::Es4 => PipelineKind::Es4,
            Kind::Sbtn => PipelineKind::Sbtn,
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct IndicatorSummary {
    valid_cells: usize,
    min: Option<f64>,
    max: Option<f64>,
    /// Cell count per class, index 0 = unclassified.
    #[serde(skip_serializing_if = "Option::is_none")]
    class_counts: Option<Vec<usize>>,
}

#[derive(Serialize)]
struct PipelineReport {
    pipeline: PipelineKind,
    width: usize,
    height: usize,
    indicators: BTreeMap<String, IndicatorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site_score: Option<SiteScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    natural_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    asset_scores: Vec<AssetScore>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    k_uncertainty: BTreeMap<String, f64>,
}

fn summarise(grid: &Grid, classes: Option<&Vec<u16>>) -> IndicatorSummary {
    let range = grid.value_range();
    IndicatorSummary {
        valid_cells: grid.valid_count(),
        min: range.map(|r| r.0),
        max: range.map(|r| r.1),
        class_counts: classes.map(|cls| {
            let n = cls.iter().copied().max().unwrap_or(0) as usize + 1;
            let mut counts = vec![0; n];
            for &c in cls {
                counts[c as usize] += 1;
            }
            counts
        }),
    }
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(output = %path.display(), "results written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn load_layers(path: &Path) -> Result<SiteLayers> {
    SiteLayers::load(path).with_context(|| format!("reading layer document {}", path.display()))
}

fn load_point_list(path: &Path) -> Result<Vec<Point>> {
    let records = load_points(path).with_context(|| format!("reading points {}", path.display()))?;
    Ok(records.into_iter().map(|r| r.point).collect())
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn analyze(points: &Path, layers: &Path, thresholds: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let records = load_points(points).with_context(|| format!("reading points {}", points.display()))?;
    let layers = load_layers(layers)?;
    let thresholds = match thresholds {
        Some(p) => load_recharge_thresholds(p).with_context(|| format!("reading recharge thresholds {}", p.display()))?,
        None => RechargeThresholds::default(),
    };
    let rows = run_analysis(&records, &layers, &thresholds)?;
    write_json(&rows, output)
}

fn pipeline(
    kind: PipelineKind,
    layers: &Path,
    scoring: &Path,
    points: Option<&Path>,
    params: Option<&Path>,
    grids_dir: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let layers = load_layers(layers)?;
    let scoring = ScoringConfig::load(scoring).with_context(|| format!("reading scoring document {}", scoring.display()))?;
    let params: IndicatorParams = match params {
        Some(p) => serde_json::from_str(&fs::read_to_string(p)?)
            .with_context(|| format!("parsing indicator parameters {}", p.display()))?,
        None => IndicatorParams::default(),
    };
    let points = match points {
        Some(p) => load_point_list(p)?,
        None => Vec::new(),
    };

    let grids = load_site_grids(&layers)?;
    let out = run_pipeline(kind, &grids, &scoring, &points, &params)?;

    if let Some(dir) = grids_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (name, grid) in out.indicators.iter().chain(out.k_factors.iter()) {
            let path = dir.join(format!("{kind}_{name}.tif"));
            write_grid(&path, grid, &grids.dem, OUTPUT_NODATA).with_context(|| format!("writing {}", path.display()))?;
        }
        info!(dir = %dir.display(), n = out.indicators.len() + out.k_factors.len(), "indicator grids written");
    }

    let indicators = out
        .indicators
        .iter()
        .map(|(name, grid)| (name.clone(), summarise(grid, out.classified.get(name))))
        .collect();
    let report = PipelineReport {
        pipeline: kind,
        width: grids.dem.width,
        height: grids.dem.height,
        indicators,
        site_score: out.site_score,
        natural_fraction: out.natural_fraction,
        asset_scores: out.asset_scores,
        k_uncertainty: out.k_uncertainty,
    };
    write_json(&report, output)
}

fn coverage(points: &Path, layers: &Path) -> Result<()> {
    let points = load_point_list(points)?;
    let layers = load_layers(layers)?;
    let rasters = [
        ("dem", layers.dem.as_deref()),
        ("awc", layers.awc.as_deref()),
        ("clc", layers.clc.as_deref()),
        ("slope", layers.slope.as_deref()),
        ("flow_acc", layers.flow_acc.as_deref()),
    ];
    let mut report: BTreeMap<&str, CoverageReport> = BTreeMap::new();
    for (name, path) in rasters {
        let Some(path) = path else { continue };
        if !path.extension().is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff")) {
            continue;
        }
        let layer = RasterLayer::open(path, name).with_context(|| format!("reading {name} layer {}", path.display()))?;
        let cov = coverage_report(&layer, &points)?;
        if cov.n_inside_bounds < cov.n_total {
            warn!(layer = name, outside = cov.n_total - cov.n_inside_bounds, "points outside layer extent");
        }
        report.insert(name, cov);
    }
    write_json(&report, None)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Analyze {
            points,
            layers,
            thresholds,
            output,
        } => analyze(&points, &layers, thresholds.as_deref(), output.as_deref()),
        Command::Pipeline {
            kind,
            layers,
            scoring,
            points,
            params,
            grids_dir,
            output,
        } => pipeline(
            kind.into(),
            &layers,
            &scoring,
            points.as_deref(),
            params.as_deref(),
            grids_dir.as_deref(),
            output.as_deref(),
        ),
        Command::Coverage { points, layers } => coverage(&points, &layers),
    }
}
