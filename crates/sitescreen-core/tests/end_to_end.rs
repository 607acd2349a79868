//! End-to-end runs over small GeoTIFF and GeoJSON fixtures written to a
//! temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use sitescreen_core::classify::{AwcCategory, RechargeClass};
use sitescreen_core::pipeline::{IndicatorParams, PipelineKind};
use sitescreen_core::points::{parse_points, PointRecord};
use sitescreen_core::raster::write_geotiff;
use sitescreen_core::slope::SlopeProvenance;
use sitescreen_core::{
    load_site_grids, run_analysis, run_pipeline, CoordTransformer, Crs, GeoTransform, Point, RechargeThresholds,
    Sample, ScoringConfig, SiteLayers, Stage,
};
use tempfile::TempDir;

const SIZE: usize = 10;
const RES: f64 = 0.001;
const NODATA: f64 = -9999.0;

/// Rise per row for a 2 % north-south slope at `RES` degrees per row.
const RISE_PER_ROW: f64 = 0.02 * RES * 111_320.0;

fn transform() -> GeoTransform {
    GeoTransform::new(10.0, 46.0, RES, -RES)
}

fn write_tif(dir: &Path, name: &str, f: impl Fn(usize, usize) -> f64) -> PathBuf {
    let values: Vec<f64> = (0..SIZE * SIZE).map(|i| f(i / SIZE, i % SIZE)).collect();
    let path = dir.join(name);
    write_geotiff(&path, &values, SIZE, SIZE, &transform(), Crs::WGS84, Some(NODATA)).unwrap();
    path
}

struct Site {
    _dir: TempDir,
    layers: SiteLayers,
}

/// 2 % slope, 200 mm water capacity, broad-leaved forest everywhere.
fn forest_site() -> Site {
    let dir = TempDir::new().unwrap();
    let dem = write_tif(dir.path(), "dem.tif", |r, _| 500.0 - r as f64 * RISE_PER_ROW);
    let awc = write_tif(dir.path(), "awc.tif", |_, _| 200.0);
    let clc = write_tif(dir.path(), "clc.tif", |_, _| 311.0);
    Site {
        layers: SiteLayers {
            dem: Some(dem),
            awc: Some(awc),
            clc: Some(clc),
            ..Default::default()
        },
        _dir: dir,
    }
}

fn records(points: &[(&str, f64, f64)]) -> Vec<PointRecord> {
    points
        .iter()
        .map(|&(id, lon, lat)| PointRecord::new(Point::new(id, lon, lat)))
        .collect()
}

#[test]
fn forest_site_point_analysis() {
    let site = forest_site();
    let rows = run_analysis(
        &records(&[("inside", 10.0045, 45.9955), ("outside", 20.0, 45.0)]),
        &site.layers,
        &RechargeThresholds::default(),
    )
    .unwrap();
    assert_eq!(rows.len(), 2);

    let inside = &rows[0];
    assert_eq!(inside.id, "inside");
    assert_relative_eq!(inside.slope_percent.value().unwrap(), 2.0, epsilon = 1e-3);
    assert_relative_eq!(inside.awc_mm.value().unwrap(), 200.0, epsilon = 1e-9);
    assert_eq!(inside.land_cover_code, Some(311));
    assert_eq!(inside.land_cover_name, "Broad-leaved forest");
    assert_eq!(inside.recharge_class, RechargeClass::High);
    assert_eq!(inside.awc_category, AwcCategory::High);
    assert_eq!(inside.slope_quality_flag, SlopeProvenance::Approximate);
    assert!(!inside.dem_nodata_flag && !inside.awc_nodata_flag);
    assert!(!inside.near_water);

    let outside = &rows[1];
    assert!(outside.dem_nodata_flag && outside.awc_nodata_flag);
    assert!(outside.slope_percent.is_missing());
    assert_eq!(outside.land_cover_code, None);
    assert_eq!(outside.recharge_class, RechargeClass::Low);
}

const UTM_SIZE: usize = 20;
const UTM_RES: f64 = 30.0;
const UTM_ORIGIN: (f64, f64) = (500_000.0, 5_000_000.0);

fn utm_crs() -> Crs {
    Crs::from_epsg(32632)
}

fn write_utm_tif(dir: &Path, name: &str, f: impl Fn(usize, usize) -> f64) -> PathBuf {
    let values: Vec<f64> = (0..UTM_SIZE * UTM_SIZE).map(|i| f(i / UTM_SIZE, i % UTM_SIZE)).collect();
    let path = dir.join(name);
    let transform = GeoTransform::new(UTM_ORIGIN.0, UTM_ORIGIN.1, UTM_RES, -UTM_RES);
    write_geotiff(&path, &values, UTM_SIZE, UTM_SIZE, &transform, utm_crs(), Some(NODATA)).unwrap();
    path
}

/// WGS84 record at the centre of UTM cell `(row, col)`.
fn utm_record(id: &str, row: usize, col: usize) -> PointRecord {
    let x = UTM_ORIGIN.0 + UTM_RES * (col as f64 + 0.5);
    let y = UTM_ORIGIN.1 - UTM_RES * (row as f64 + 0.5);
    let (lon, lat) = CoordTransformer::to_wgs84(utm_crs()).unwrap().transform(x, y).unwrap();
    PointRecord::new(Point::new(id, lon, lat))
}

#[test]
fn projected_layers_are_warped_before_sampling() {
    let dir = TempDir::new().unwrap();
    // 2 % fall to the south, water capacity rising one unit per column with a
    // nodata block in the south-east, two land-cover classes split at column 10.
    let dem = write_utm_tif(dir.path(), "dem.tif", |r, _| 400.0 - r as f64 * 0.02 * UTM_RES);
    let awc = write_utm_tif(dir.path(), "awc.tif", |r, c| {
        if r >= 15 && c >= 15 {
            NODATA
        } else {
            100.0 + c as f64
        }
    });
    let clc = write_utm_tif(dir.path(), "clc.tif", |_, c| if c < 10 { 311.0 } else { 112.0 });
    let layers = SiteLayers {
        dem: Some(dem),
        awc: Some(awc),
        clc: Some(clc),
        ..Default::default()
    };

    let points = [
        utm_record("west", 5, 5),
        utm_record("east", 6, 14),
        utm_record("gap", 18, 18),
        PointRecord::new(Point::new("far", 12.0, 45.0)),
    ];
    let rows = run_analysis(&points, &layers, &RechargeThresholds::default()).unwrap();

    for (row, col, expected_code) in [(&rows[0], 5.0, 311), (&rows[1], 14.0, 112)] {
        assert_relative_eq!(row.slope_percent.value().unwrap(), 2.0, epsilon = 0.05);
        let awc = row.awc_mm.value().unwrap();
        assert!((awc - (100.0 + col)).abs() < 1.0, "{}: awc {awc}", row.id);
        assert!((awc - awc.round()).abs() > 1e-9, "{}: awc {awc} not interpolated", row.id);
        assert_eq!(row.land_cover_code, Some(expected_code));
        assert!(!row.dem_nodata_flag && !row.awc_nodata_flag);
        assert_eq!(row.recharge_class, RechargeClass::Medium);
    }
    assert!(rows.iter().filter_map(|r| r.land_cover_code).all(|c| c == 311 || c == 112));

    let gap = &rows[2];
    assert!(gap.awc_nodata_flag && !gap.dem_nodata_flag);
    assert!(gap.awc_mm.is_missing());

    let far = &rows[3];
    assert!(far.dem_nodata_flag && far.awc_nodata_flag);
    assert_eq!(far.land_cover_code, None);
}

#[test]
fn edge_point_has_no_slope_but_keeps_elevation() {
    let site = forest_site();
    let rows = run_analysis(
        &records(&[("edge", 10.0005, 45.9995)]),
        &site.layers,
        &RechargeThresholds::default(),
    )
    .unwrap();
    assert!(rows[0].slope_percent.is_missing());
    assert!(!rows[0].dem_nodata_flag);
}

#[test]
fn precomputed_slope_replaces_the_estimate() {
    let mut site = forest_site();
    let slope = write_tif(site._dir.path(), "slope_pct.tif", |_, _| 12.0);
    site.layers.slope = Some(slope);

    let rows = run_analysis(
        &records(&[("a", 10.0005, 45.9995)]),
        &site.layers,
        &RechargeThresholds::default(),
    )
    .unwrap();
    let r = &rows[0];
    assert_relative_eq!(r.slope_percent.value().unwrap(), 12.0, epsilon = 1e-9);
    assert_eq!(r.slope_quality_flag, SlopeProvenance::Precomputed);
    assert_eq!(r.recharge_class, RechargeClass::Medium);
}

#[test]
fn vector_land_cover_join() {
    let mut site = forest_site();
    let geojson = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"CODE_18": "512"},
             "geometry": {"type": "Polygon", "coordinates": [[[10.0, 45.995], [10.005, 45.995], [10.005, 46.0], [10.0, 46.0], [10.0, 45.995]]]}},
            {"type": "Feature", "properties": {"CODE_18": "411"},
             "geometry": {"type": "Polygon", "coordinates": [[[10.005, 45.99], [10.01, 45.99], [10.01, 45.995], [10.005, 45.995], [10.005, 45.99]]]}}
        ]
    }"#;
    let clc = site._dir.path().join("clc.geojson");
    fs::write(&clc, geojson).unwrap();
    site.layers.clc = Some(clc);

    let rows = run_analysis(
        &records(&[("lake", 10.002, 45.998), ("bog", 10.007, 45.992), ("none", 10.002, 45.992)]),
        &site.layers,
        &RechargeThresholds::default(),
    )
    .unwrap();
    assert_eq!(rows[0].land_cover_code, Some(512));
    assert!(rows[0].near_water && !rows[0].near_wetland);
    assert_eq!(rows[1].land_cover_code, Some(411));
    assert!(rows[1].near_wetland);
    assert_eq!(rows[2].land_cover_code, None);
    assert_eq!(rows[2].land_cover_name, "Unknown");
}

#[test]
fn geojson_points_feed_the_analysis() {
    let site = forest_site();
    let records = parse_points(
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"asset_id": "P-7", "water_use_m3y": 900},
             "geometry": {"type": "Point", "coordinates": [10.0045, 45.9955]}}
        ]}"#,
    )
    .unwrap();
    let rows = run_analysis(&records, &site.layers, &RechargeThresholds::default()).unwrap();
    assert_eq!(rows[0].id, "P-7");
    assert!(!rows[0].water_stress_flag);
}

#[test]
fn missing_water_capacity_file_is_tagged() {
    let mut site = forest_site();
    site.layers.awc = Some(site._dir.path().join("nope.tif"));
    let err = run_analysis(&records(&[("a", 10.004, 45.996)]), &site.layers, &RechargeThresholds::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::AwcSample));
    assert!(err.to_string().starts_with("[stage:awc_sample]"));
}

#[test]
fn absent_water_capacity_path_gives_missing_column() {
    let mut site = forest_site();
    site.layers.awc = None;
    let rows = run_analysis(&records(&[("a", 10.004, 45.996)]), &site.layers, &RechargeThresholds::default()).unwrap();
    assert!(rows[0].awc_nodata_flag);
    assert_eq!(rows[0].recharge_class, RechargeClass::Low);
}

#[test]
fn land_cover_without_crs_is_tagged() {
    let mut site = forest_site();
    let clc = site._dir.path().join("clc.geojson");
    fs::write(
        &clc,
        r#"{"type": "FeatureCollection", "crs": {"type": "name", "properties": {"name": "bogus"}}, "features": []}"#,
    )
    .unwrap();
    site.layers.clc = Some(clc);
    let err = run_analysis(&records(&[("a", 10.004, 45.996)]), &site.layers, &RechargeThresholds::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Clc));
}

fn scoring() -> ScoringConfig {
    ScoringConfig::from_json(
        r#"{"indicators": {
            "erosion": {"bins": [0.33, 0.66], "labels": ["low", "medium", "high"]},
            "fragmentation": {"bins": [0.33, 0.66], "labels": ["fragmented", "mixed", "intact"]},
            "runoff": {"bins": [0.33, 0.66], "labels": ["low", "medium", "high"]}
        }}"#,
    )
    .unwrap()
}

#[test]
fn tnfd_pipeline_over_forest_site() {
    let site = forest_site();
    let grids = load_site_grids(&site.layers).unwrap();
    let points = [Point::new("A", 10.0045, 45.9955)];
    let out = run_pipeline(PipelineKind::Tnfd, &grids, &scoring(), &points, &IndicatorParams::default()).unwrap();

    let frag = &out.indicators["fragmentation"];
    assert_eq!(frag.valid_count(), SIZE * SIZE);
    assert!(frag.data.iter().all(|s| *s == Sample::Value(1.0)));
    assert!(out.classified["fragmentation"].iter().all(|&c| c == 3));

    let (_, erosion_max) = out.indicators["erosion"].value_range().unwrap();
    assert_relative_eq!(erosion_max, 1.0, epsilon = 1e-4);

    let score = out.site_score.unwrap();
    assert_relative_eq!(score.mean_class["fragmentation"], 3.0);
    assert!(score.composite.is_some());

    let asset = &out.asset_scores[0];
    assert_eq!(asset.classes["fragmentation_class"], 3);
    assert!(asset.values.contains_key("flood"));
    assert!(!asset.classes.contains_key("flood_class"));
}

#[test]
fn sbtn_pipeline_reports_natural_fraction() {
    let site = forest_site();
    let grids = load_site_grids(&site.layers).unwrap();
    let out = run_pipeline(PipelineKind::Sbtn, &grids, &ScoringConfig::default(), &[], &IndicatorParams::default())
        .unwrap();
    assert_eq!(out.natural_fraction, Some(1.0));
    assert!(out.classified.is_empty());
    assert!(out.indicators.contains_key("recharge"));
    assert!(!out.indicators.contains_key("runoff"));
}

#[test]
fn pipeline_rejects_misaligned_layers() {
    let mut site = forest_site();
    let small = site._dir.path().join("awc_small.tif");
    write_geotiff(&small, &[100.0; 4], 2, 2, &transform(), Crs::WGS84, None).unwrap();
    site.layers.awc = Some(small);
    let err = load_site_grids(&site.layers).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Awc));
    assert!(err.to_string().contains("expected 10x10"));
}

#[test]
fn pipeline_needs_raster_land_cover() {
    let mut site = forest_site();
    site.layers.clc = Some(site._dir.path().join("clc.geojson"));
    let err = load_site_grids(&site.layers).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Clc));
}
