/// Single-point diagnostic: run the full point analysis at one location and
/// print the assembled record, or `FAILED <reason>` with exit code 2.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sitescreen_core::config::load_recharge_thresholds;
use sitescreen_core::points::PointRecord;
use sitescreen_core::{run_analysis, Point, RechargeThresholds, SiteLayers};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "self_check", about = "Sample every site layer at one point and print the screening record")]
struct Args {
    /// Latitude (WGS84 degrees)
    #[arg(allow_negative_numbers = true)]
    lat: f64,

    /// Longitude (WGS84 degrees)
    #[arg(allow_negative_numbers = true)]
    lon: f64,

    /// DEM GeoTIFF
    dem: PathBuf,

    /// Available water capacity GeoTIFF
    awc: PathBuf,

    /// Land cover: GeoTIFF or GeoJSON polygons
    clc: PathBuf,

    /// Precomputed slope-percent GeoTIFF
    slope: Option<PathBuf>,

    /// Recharge tier document (defaults: high 150/5, medium 50/15)
    #[arg(long)]
    thresholds: Option<PathBuf>,
}

fn run(args: &Args) -> Result<String> {
    let thresholds = match &args.thresholds {
        Some(path) => load_recharge_thresholds(path)
            .with_context(|| format!("reading recharge thresholds {}", path.display()))?,
        None => RechargeThresholds::default(),
    };
    let layers = SiteLayers {
        dem: Some(args.dem.clone()),
        awc: Some(args.awc.clone()),
        clc: Some(args.clc.clone()),
        slope: args.slope.clone(),
        ..Default::default()
    };
    let record = PointRecord::new(Point::new("self_check", args.lon, args.lat));
    let rows = run_analysis(&[record], &layers, &thresholds)?;
    let row = rows.first().context("analysis produced no row")?;
    Ok(serde_json::to_string_pretty(row)?)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(row) => {
            println!("{row}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("FAILED {e:#}");
            ExitCode::from(2)
        }
    }
}
