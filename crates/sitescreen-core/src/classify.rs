//! Threshold classification of indicator values and site score aggregation,
//! plus the two-tier recharge rule applied directly to sampled
//! (water capacity, slope) pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sample::Sample;

/// Class index reserved for missing or unclassifiable input.
pub const MISSING_CLASS: u16 = 0;

// ── Threshold tables ──────────────────────────────────────────────────────────

/// Strictly increasing bin edges with one more label than edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdTable {
    bins: Vec<f64>,
    labels: Vec<String>,
}

impl ThresholdTable {
    /// Validate and build a table; `name` is used in error messages.
    pub fn new(name: &str, bins: Vec<f64>, labels: Vec<String>) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidThresholds {
            name: name.to_string(),
            reason,
        };
        if let Some(b) = bins.iter().find(|b| !b.is_finite()) {
            return Err(invalid(format!("non-finite bin edge {b}")));
        }
        if let Some(w) = bins.windows(2).find(|w| w[0] >= w[1]) {
            return Err(invalid(format!("bin edges not strictly increasing at {} >= {}", w[0], w[1])));
        }
        if labels.len() != bins.len() + 1 {
            return Err(invalid(format!(
                "{} bin edges need {} labels, found {}",
                bins.len(),
                bins.len() + 1,
                labels.len()
            )));
        }
        Ok(Self { bins, labels })
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of non-missing classes.
    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    /// Class of one value: `1 + #{edges <= x}`, or 0 when missing.
    pub fn class_of(&self, value: Sample) -> u16 {
        match value.value() {
            Some(x) => (self.bins.partition_point(|&b| b <= x) + 1) as u16,
            None => MISSING_CLASS,
        }
    }

    /// Label of a class index; `None` for the missing class or out of range.
    pub fn label(&self, class: u16) -> Option<&str> {
        let i = usize::from(class).checked_sub(1)?;
        self.labels.get(i).map(String::as_str)
    }
}

/// Classify values against a table; right-open bins, 0 for missing.
pub fn classify(values: &[Sample], table: &ThresholdTable) -> Vec<u16> {
    values.iter().map(|&v| table.class_of(v)).collect()
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Per-indicator mean class and their weighted composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteScore {
    /// Mean class over classified cells, for indicators with at least one.
    pub mean_class: BTreeMap<String, f64>,
    /// Weighted mean of `mean_class`; `None` when no weight remains.
    pub composite: Option<f64>,
}

/// Aggregate classified layers. Indicators without classified cells are left
/// out of both the weighted sum and the weight total. Missing weights are 1.
pub fn aggregate(classified: &BTreeMap<String, Vec<u16>>, weights: Option<&BTreeMap<String, f64>>) -> SiteScore {
    let mut mean_class = BTreeMap::new();
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (name, classes) in classified {
        let (sum, n) = classes
            .iter()
            .filter(|&&c| c != MISSING_CLASS)
            .fold((0.0, 0usize), |(s, n), &c| (s + f64::from(c), n + 1));
        if n == 0 {
            continue;
        }
        let mean = sum / n as f64;
        let w = weights.and_then(|w| w.get(name)).copied().unwrap_or(1.0);
        mean_class.insert(name.clone(), mean);
        weighted += w * mean;
        total += w;
    }
    SiteScore {
        mean_class,
        composite: (total > 0.0).then(|| weighted / total),
    }
}

// ── Recharge screening ────────────────────────────────────────────────────────

/// One tier of the recharge rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RechargeTier {
    pub awc_min: f64,
    pub slope_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RechargeThresholds {
    pub high: RechargeTier,
    pub medium: RechargeTier,
}

impl Default for RechargeThresholds {
    fn default() -> Self {
        Self {
            high: RechargeTier {
                awc_min: 150.0,
                slope_max: 5.0,
            },
            medium: RechargeTier {
                awc_min: 50.0,
                slope_max: 15.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RechargeClass {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwcCategory {
    Unknown,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Two-tier recharge rule on sampled water capacity (mm) and slope (%).
///
/// High: capacity at or above the high minimum and slope strictly below the
/// high maximum. Medium: capacity at or above the medium minimum, or slope at
/// or below the medium maximum. Anything else, and any missing input, is Low.
pub fn classify_recharge(awc_mm: Sample, slope_percent: Sample, thr: &RechargeThresholds) -> RechargeClass {
    let (Some(a), Some(s)) = (awc_mm.value(), slope_percent.value()) else {
        return RechargeClass::Low;
    };
    if a >= thr.high.awc_min && s < thr.high.slope_max {
        RechargeClass::High
    } else if a >= thr.medium.awc_min || s <= thr.medium.slope_max {
        RechargeClass::Medium
    } else {
        RechargeClass::Low
    }
}

/// Water-capacity band on the recharge tier minimums.
pub fn awc_category(awc_mm: Sample, thr: &RechargeThresholds) -> AwcCategory {
    match awc_mm.value() {
        None => AwcCategory::Unknown,
        Some(a) if a < thr.medium.awc_min => AwcCategory::Low,
        Some(a) if a < thr.high.awc_min => AwcCategory::Medium,
        Some(_) => AwcCategory::High,
    }
}

/// Heuristic confidence from the distance of both inputs to their nearest
/// tier edge: high at ≥ 30 mm and ≥ 5 %, medium at ≥ 10 mm and ≥ 2 %.
pub fn recharge_confidence(awc_mm: Sample, slope_percent: Sample, thr: &RechargeThresholds) -> Confidence {
    let (Some(a), Some(s)) = (awc_mm.value(), slope_percent.value()) else {
        return Confidence::Low;
    };
    let awc_margin = (a - thr.medium.awc_min).abs().min((a - thr.high.awc_min).abs());
    let slope_margin = (s - thr.high.slope_max).abs().min((s - thr.medium.slope_max).abs());
    if awc_margin >= 30.0 && slope_margin >= 5.0 {
        Confidence::High
    } else if awc_margin >= 10.0 && slope_margin >= 2.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
