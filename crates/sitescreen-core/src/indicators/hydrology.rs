//! Surface runoff and flood susceptibility.
//!
//! Slope is in degrees, water capacity in mm, land cover as CLC codes. These
//! are screening indices, not a hydrological model.

use serde::{Deserialize, Serialize};

use crate::indicators::Normalization;
use crate::landcover::{code_of, CROPLAND, FOREST, SHRUB_GRASS, URBAN, WATER_BODIES};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunoffParams {
    /// Fixed 0–35° domain so scores compare across sites.
    pub slope_normalization: Normalization,
    /// Percentile range so single outliers do not flatten the rest.
    pub awc_normalization: Normalization,
    pub slope_weight: f64,
    pub awc_weight: f64,
    pub land_cover_weight: f64,
}

impl Default for RunoffParams {
    fn default() -> Self {
        Self {
            slope_normalization: Normalization::Domain { min: 0.0, max: 35.0 },
            awc_normalization: Normalization::Percentile { low: 2.0, high: 98.0 },
            slope_weight: 0.4,
            awc_weight: 0.3,
            land_cover_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodParams {
    pub runoff_weight: f64,
    pub flow_weight: f64,
    pub flow_normalization: Normalization,
}

impl Default for FloodParams {
    fn default() -> Self {
        Self {
            runoff_weight: 0.6,
            flow_weight: 0.4,
            flow_normalization: Normalization::Percentile { low: 2.0, high: 98.0 },
        }
    }
}

/// Qualitative runoff factor of a land-cover code.
pub fn land_cover_runoff_factor(code: i64) -> f64 {
    match code {
        c if URBAN.contains(&c) => 0.9,
        c if CROPLAND.contains(&c) => 0.6,
        c if FOREST.contains(&c) => 0.2,
        c if SHRUB_GRASS.contains(&c) => 0.4,
        c if WATER_BODIES.contains(&c) => 0.5,
        _ => 0.5,
    }
}

/// Runoff coefficient in [0, 1]:
/// `w_s · slope_n + w_a · (1 − awc_n) + w_l · land_cover_factor`, clipped.
pub fn runoff_coefficient(
    slope_deg: &[Sample],
    awc_mm: &[Sample],
    land_cover: &[Sample],
    params: &RunoffParams,
) -> Vec<Sample> {
    let slope_n = params.slope_normalization.apply(slope_deg);
    let awc_n = params.awc_normalization.apply(awc_mm);
    slope_n
        .iter()
        .zip(&awc_n)
        .zip(land_cover)
        .map(|((&s, &a), &lc)| match (s.value(), a.value(), code_of(lc)) {
            (Some(s), Some(a), Some(code)) => {
                let v = params.slope_weight * s
                    + params.awc_weight * (1.0 - a)
                    + params.land_cover_weight * land_cover_runoff_factor(code);
                Sample::finite(v.clamp(0.0, 1.0))
            }
            _ => Sample::Missing,
        })
        .collect()
}

/// Flood susceptibility in [0, 1].
///
/// Equal to runoff unless flow accumulation is supplied, then
/// `w_r · runoff + w_f · flow_n`. With a flow layer, a cell missing flow is
/// missing.
pub fn flood_susceptibility(runoff: &[Sample], flow_acc: Option<&[Sample]>, params: &FloodParams) -> Vec<Sample> {
    let Some(flow_acc) = flow_acc else {
        return runoff.to_vec();
    };
    let flow_n = params.flow_normalization.apply(flow_acc);
    runoff
        .iter()
        .zip(&flow_n)
        .map(|(&r, &f)| match (r.value(), f.value()) {
            (Some(r), Some(f)) => {
                Sample::finite((params.runoff_weight * r + params.flow_weight * f).clamp(0.0, 1.0))
            }
            _ => Sample::Missing,
        })
        .collect()
}
