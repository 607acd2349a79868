/// Derive a slope-percent GeoTIFF from a DEM so later runs can supply it as a
/// precomputed slope layer. Output: `<out-dir>/<dem stem>_slope_pct.tif`.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sitescreen_core::raster::write_grid;
use sitescreen_core::slope::slope_percent_grid;
use sitescreen_core::RasterLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

const OUTPUT_NODATA: f64 = -9999.0;

#[derive(Parser, Debug)]
#[command(name = "slope_raster", about = "Write a slope-percent GeoTIFF on the DEM's grid")]
struct Args {
    /// DEM GeoTIFF
    dem: PathBuf,

    /// Output directory (defaults to the DEM's directory)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

fn output_path(dem: &Path, out_dir: Option<&Path>) -> Result<PathBuf> {
    let stem = dem
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("no file stem in {}", dem.display()))?;
    let dir = match out_dir {
        Some(d) => d.to_path_buf(),
        None => dem.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{stem}_slope_pct.tif")))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let out = output_path(&args.dem, args.out_dir.as_deref())?;
    if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let dem = RasterLayer::open(&args.dem, "dem").with_context(|| format!("reading DEM {}", args.dem.display()))?;
    let slope = slope_percent_grid(&dem.to_grid(), &dem.transform, dem.crs);
    write_grid(&out, &slope, &dem, OUTPUT_NODATA).with_context(|| format!("writing {}", out.display()))?;

    let range = slope.value_range();
    info!(
        output = %out.display(),
        width = dem.width,
        height = dem.height,
        valid = slope.valid_count(),
        range = ?range,
        "slope written"
    );
    println!("{}", out.display());
    Ok(())
}
