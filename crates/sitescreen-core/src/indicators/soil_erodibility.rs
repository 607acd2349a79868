//! Soil erodibility (K-factor) layers: normalisation and uncertainty.
//!
//! K-factor products come in several variants (Ksat-based, Wischmeier
//! texture, GloSEM) plus error rasters giving 90% prediction intervals.
//! Any of them may be absent for a site.

use std::collections::BTreeMap;

use crate::grid::Grid;
use crate::indicators::percentile;
use crate::sample::Sample;

/// Optional K-factor grids for one site, all of the DEM's shape.
#[derive(Debug, Clone, Default)]
pub struct KFactorLayers {
    pub k_ksat: Option<Grid>,
    pub k_wischmeier: Option<Grid>,
    pub k_glosem: Option<Grid>,
    pub k_ksat_error: Option<Grid>,
    pub k_wischmeier_error: Option<Grid>,
}

impl KFactorLayers {
    pub fn is_empty(&self) -> bool {
        self.k_ksat.is_none()
            && self.k_wischmeier.is_none()
            && self.k_glosem.is_none()
            && self.k_ksat_error.is_none()
            && self.k_wischmeier_error.is_none()
    }
}

fn sorted_values<'a>(values: impl Iterator<Item = &'a Sample>, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let mut v: Vec<f64> = values.filter_map(|s| s.value()).map(f).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// K-factor rescaled to [0, 1] between its 2nd and 98th percentiles.
/// A flat layer maps to 0.5.
pub fn normalise_k(k: &Grid) -> Grid {
    let sorted = sorted_values(k.data.iter(), |x| x);
    if sorted.is_empty() {
        return Grid::missing(k.width, k.height);
    }
    let lo = percentile(&sorted, 2.0);
    let hi = percentile(&sorted, 98.0);
    let data = k
        .data
        .iter()
        .map(|s| {
            s.map(|x| {
                if hi <= lo {
                    0.5
                } else {
                    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
                }
            })
        })
        .collect();
    Grid {
        data,
        width: k.width,
        height: k.height,
    }
}

/// Normalised variants keyed by name, for the layers that are present.
pub fn normalised_k_maps(k: &KFactorLayers) -> BTreeMap<&'static str, Grid> {
    [
        ("k_ksat", &k.k_ksat),
        ("k_wischmeier", &k.k_wischmeier),
        ("k_glosem", &k.k_glosem),
    ]
    .into_iter()
    .filter_map(|(name, g)| g.as_ref().map(|g| (name, normalise_k(g))))
    .collect()
}

/// Width of an error layer's distribution: P90 − P10 of |error|.
/// `None` when the layer is absent or has no valid cells.
pub fn uncertainty_width(error: Option<&Grid>) -> Option<f64> {
    let sorted = sorted_values(error?.data.iter(), f64::abs);
    if sorted.is_empty() {
        return None;
    }
    Some(percentile(&sorted, 90.0) - percentile(&sorted, 10.0))
}

/// Uncertainty widths keyed by error layer name.
pub fn uncertainty_widths(k: &KFactorLayers) -> BTreeMap<&'static str, f64> {
    [
        ("k_ksat_error", k.k_ksat_error.as_ref()),
        ("k_wischmeier_error", k.k_wischmeier_error.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, g)| uncertainty_width(g).map(|w| (name, w)))
    .collect()
}
