//! Groundwater recharge potential.

use serde::{Deserialize, Serialize};

use crate::indicators::{joint_mask, masked, Normalization};
use crate::landcover::{code_of, FOREST, SHRUB_GRASS, URBAN};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RechargeParams {
    pub awc_normalization: Normalization,
    /// Multiplier for forest and grassland cover.
    pub vegetated_modifier: f64,
    /// Multiplier for artificial surfaces.
    pub urban_modifier: f64,
}

impl Default for RechargeParams {
    fn default() -> Self {
        Self {
            awc_normalization: Normalization::MinMax,
            vegetated_modifier: 1.1,
            urban_modifier: 0.7,
        }
    }
}

/// Land-cover multiplier applied to normalised water capacity.
pub fn land_cover_modifier(code: i64, params: &RechargeParams) -> f64 {
    if FOREST.contains(&code) || SHRUB_GRASS.contains(&code) {
        params.vegetated_modifier
    } else if URBAN.contains(&code) {
        params.urban_modifier
    } else {
        1.0
    }
}

/// Recharge index in [0, 1]: normalised water capacity times the land-cover
/// modifier, rescaled by its own maximum.
pub fn recharge_index(awc_mm: &[Sample], land_cover: &[Sample], params: &RechargeParams) -> Vec<Sample> {
    let mask = joint_mask(&[awc_mm, land_cover]);
    let awc_n = params.awc_normalization.apply(&masked(awc_mm, &mask));
    let raw: Vec<Sample> = awc_n
        .iter()
        .zip(land_cover)
        .map(|(&a, &lc)| match (a.value(), code_of(lc)) {
            (Some(a), Some(code)) => Sample::finite(a * land_cover_modifier(code, params)),
            _ => Sample::Missing,
        })
        .collect();
    Normalization::MaxRatio.apply(&raw)
}
