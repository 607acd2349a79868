//! Relative soil erosion potential, a simplified slope × soil × cover index.

use serde::{Deserialize, Serialize};

use crate::indicators::{joint_mask, masked, Normalization};
use crate::landcover::{code_of, BARE, FOREST, URBAN};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionParams {
    pub awc_normalization: Normalization,
    pub forest_protection: f64,
    pub exposed_protection: f64,
    pub default_protection: f64,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            awc_normalization: Normalization::MinMax,
            forest_protection: 0.2,
            exposed_protection: 0.8,
            default_protection: 0.5,
        }
    }
}

/// Cover term of the index: low under forest, high on sealed or bare ground.
pub fn land_cover_protection_factor(code: i64, params: &ErosionParams) -> f64 {
    if FOREST.contains(&code) {
        params.forest_protection
    } else if URBAN.contains(&code) || BARE.contains(&code) {
        params.exposed_protection
    } else {
        params.default_protection
    }
}

/// Erosion potential in [0, 1]:
/// `slope_n · (0.5 · (1 − awc_n) + 0.5 · protection)` rescaled by its maximum,
/// where `slope_n` is `tan(slope)` over its own maximum.
pub fn erosion_potential(
    slope_deg: &[Sample],
    awc_mm: &[Sample],
    land_cover: &[Sample],
    params: &ErosionParams,
) -> Vec<Sample> {
    let mask = joint_mask(&[slope_deg, awc_mm, land_cover]);
    let tan_slope: Vec<Sample> = masked(slope_deg, &mask)
        .iter()
        .map(|s| s.map(|deg| deg.to_radians().tan()))
        .collect();
    let slope_n = Normalization::MaxRatio.apply(&tan_slope);
    let awc_n = params.awc_normalization.apply(&masked(awc_mm, &mask));

    let raw: Vec<Sample> = slope_n
        .iter()
        .zip(&awc_n)
        .zip(land_cover)
        .map(|((&s, &a), &lc)| match (s.value(), a.value(), code_of(lc)) {
            (Some(s), Some(a), Some(code)) => {
                let soil_cover = 0.5 * (1.0 - a) + 0.5 * land_cover_protection_factor(code, params);
                Sample::finite(s * soil_cover)
            }
            _ => Sample::Missing,
        })
        .collect();
    Normalization::MaxRatio.apply(&raw)
}
