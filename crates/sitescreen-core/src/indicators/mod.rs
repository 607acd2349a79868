//! Environmental indicators computed cell by cell from sampled layers.
//!
//! Every indicator takes equally sized slices of [`Sample`]s (one per cell or
//! per point) and returns one sample per input position. An output is
//! missing wherever an input it depends on is missing; an all-missing input
//! gives an all-missing output.

pub mod erosion;
pub mod fragmentation;
pub mod hydrology;
pub mod recharge;
pub mod soil_erodibility;

use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Guard added to data-driven denominators.
pub const EPS: f64 = 1e-6;

/// How a layer is rescaled to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// `(x - min) / (max - min + EPS)` over the valid values of this call.
    MinMax,
    /// `x / (max + EPS)` over the valid values of this call.
    MaxRatio,
    /// Clipped to the `low`..`high` percentiles of the valid values;
    /// flat data maps to 0.
    Percentile { low: f64, high: f64 },
    /// Clipped to a fixed physical domain, independent of the data.
    Domain { min: f64, max: f64 },
}

impl Normalization {
    /// Rescale the valid values; missing stays missing.
    pub fn apply(&self, values: &[Sample]) -> Vec<Sample> {
        let valid: Vec<f64> = values.iter().filter_map(|s| s.value()).collect();
        if valid.is_empty() {
            return vec![Sample::Missing; values.len()];
        }
        let map: Box<dyn Fn(f64) -> f64> = match *self {
            Normalization::MinMax => {
                let (lo, hi) = min_max(&valid);
                Box::new(move |x| (x - lo) / (hi - lo + EPS))
            }
            Normalization::MaxRatio => {
                let (_, hi) = min_max(&valid);
                Box::new(move |x| x / (hi + EPS))
            }
            Normalization::Percentile { low, high } => {
                let mut sorted = valid;
                sorted.sort_by(f64::total_cmp);
                clipped(percentile(&sorted, low), percentile(&sorted, high))
            }
            Normalization::Domain { min, max } => clipped(min, max),
        };
        values.iter().map(|s| s.map(&map)).collect()
    }
}

fn clipped(lo: f64, hi: f64) -> Box<dyn Fn(f64) -> f64> {
    if hi <= lo {
        Box::new(|_| 0.0)
    } else {
        Box::new(move |x| ((x - lo) / (hi - lo)).clamp(0.0, 1.0))
    }
}

pub(crate) fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Linear-interpolated percentile `p` (0–100) of ascending `sorted` data.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Keep `values[i]` only where `mask[i]` is true.
pub(crate) fn masked(values: &[Sample], mask: &[bool]) -> Vec<Sample> {
    values
        .iter()
        .zip(mask)
        .map(|(&v, &keep)| if keep { v } else { Sample::Missing })
        .collect()
}

/// Cells where every layer has a value.
pub(crate) fn joint_mask(layers: &[&[Sample]]) -> Vec<bool> {
    let n = layers.first().map_or(0, |l| l.len());
    (0..n).map(|i| layers.iter().all(|l| !l[i].is_missing())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn samples(v: &[f64]) -> Vec<Sample> {
        v.iter().map(|&x| Sample::Value(x)).collect()
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&data, 0.0), 1.0);
        assert_relative_eq!(percentile(&data, 50.0), 3.0);
        assert_relative_eq!(percentile(&data, 98.0), 4.92, epsilon = 1e-12);
        assert_relative_eq!(percentile(&data, 100.0), 5.0);
    }

    #[test]
    fn domain_normalisation_is_data_independent() {
        let n = Normalization::Domain { min: 0.0, max: 35.0 };
        let out = n.apply(&samples(&[0.0, 17.5, 70.0]));
        assert_eq!(out, samples(&[0.0, 0.5, 1.0]));
        // Same value, different company, same score.
        let other = n.apply(&samples(&[17.5, 1.0]));
        assert_eq!(other[0], Sample::Value(0.5));
    }

    #[test]
    fn minmax_uses_current_data_and_keeps_missing() {
        let out = Normalization::MinMax.apply(&[Sample::Value(10.0), Sample::Missing, Sample::Value(20.0)]);
        assert_relative_eq!(out[0].value().unwrap(), 0.0);
        assert!(out[1].is_missing());
        assert_relative_eq!(out[2].value().unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn flat_percentile_range_maps_to_zero() {
        let out = Normalization::Percentile { low: 2.0, high: 98.0 }.apply(&samples(&[7.0, 7.0, 7.0]));
        assert_eq!(out, samples(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn all_missing_stays_missing() {
        let out = Normalization::MaxRatio.apply(&[Sample::Missing; 4]);
        assert_eq!(out, vec![Sample::Missing; 4]);
    }

    #[test]
    fn percentile_clips_outliers() {
        let mut v: Vec<f64> = (0..100).map(f64::from).collect();
        v.push(10_000.0);
        let out = Normalization::Percentile { low: 2.0, high: 98.0 }.apply(&samples(&v));
        assert_eq!(out[100], Sample::Value(1.0));
        assert_eq!(out[0], Sample::Value(0.0));
    }
}
