//! JSON configuration documents: scoring thresholds, recharge tiers and the
//! per-site layer paths.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::{RechargeThresholds, ThresholdTable};
use crate::error::{Error, Result};

/// `{"indicators": {name: {"bins": [...], "labels": [...]}}, "weights": {...}}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringConfig {
    pub indicators: BTreeMap<String, ThresholdTable>,
    /// Composite weights per indicator; absent entries weigh 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,
}

impl ScoringConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawScoring = serde_json::from_str(text)?;
        let mut indicators = BTreeMap::new();
        for (name, table) in raw.indicators {
            let table = ThresholdTable::new(&name, table.bins, table.labels)?;
            indicators.insert(name, table);
        }
        Ok(Self {
            indicators,
            weights: raw.weights,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

// Tables are validated by hand so errors carry the indicator name.
#[derive(Deserialize)]
struct RawScoring {
    #[serde(default)]
    indicators: BTreeMap<String, RawTable>,
    #[serde(default)]
    weights: Option<BTreeMap<String, f64>>,
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    bins: Vec<f64>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RechargeDoc {
    recharge: RechargeThresholds,
}

/// `{"recharge": {"high": {"awc_min", "slope_max"}, "medium": {...}}}`
pub fn parse_recharge_thresholds(text: &str) -> Result<RechargeThresholds> {
    let doc: RechargeDoc = serde_json::from_str(text)?;
    let t = doc.recharge;
    let values = [t.high.awc_min, t.high.slope_max, t.medium.awc_min, t.medium.slope_max];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidThresholds {
            name: "recharge".into(),
            reason: "tier values must be finite".into(),
        });
    }
    Ok(t)
}

pub fn load_recharge_thresholds(path: &Path) -> Result<RechargeThresholds> {
    parse_recharge_thresholds(&fs::read_to_string(path)?)
}

/// Input layer paths for one site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteLayers {
    pub dem: Option<PathBuf>,
    pub awc: Option<PathBuf>,
    /// Land cover, a GeoTIFF or a GeoJSON polygon layer.
    pub clc: Option<PathBuf>,
    /// Precomputed slope in percent; replaces the DEM estimate.
    #[serde(default)]
    pub slope: Option<PathBuf>,
    #[serde(default)]
    pub flow_acc: Option<PathBuf>,
    #[serde(default)]
    pub k_ksat: Option<PathBuf>,
    #[serde(default)]
    pub k_wischmeier: Option<PathBuf>,
    #[serde(default)]
    pub k_glosem: Option<PathBuf>,
    #[serde(default)]
    pub k_ksat_error: Option<PathBuf>,
    #[serde(default)]
    pub k_wischmeier_error: Option<PathBuf>,
}

impl SiteLayers {
    pub fn load(path: &Path) -> Result<Self> {
        let mut layers: SiteLayers = serde_json::from_str(&fs::read_to_string(path)?)?;
        // Relative paths are taken from the document's directory.
        if let Some(base) = path.parent() {
            layers.resolve(base);
        }
        Ok(layers)
    }

    fn resolve(&mut self, base: &Path) {
        for p in [
            &mut self.dem,
            &mut self.awc,
            &mut self.clc,
            &mut self.slope,
            &mut self.flow_acc,
            &mut self.k_ksat,
            &mut self.k_wischmeier,
            &mut self.k_glosem,
            &mut self.k_ksat_error,
            &mut self.k_wischmeier_error,
        ]
        .into_iter()
        .flatten()
        {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// Path of a required layer, or a configuration error naming it.
    pub fn require(&self, name: &'static str) -> Result<&Path> {
        let p = match name {
            "dem" => self.dem.as_deref(),
            "awc" => self.awc.as_deref(),
            "clc" => self.clc.as_deref(),
            "slope" => self.slope.as_deref(),
            "flow_acc" => self.flow_acc.as_deref(),
            _ => None,
        };
        p.ok_or(Error::MissingLayer(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_document_is_validated_per_indicator() {
        let ok = ScoringConfig::from_json(
            r#"{"indicators": {"runoff": {"bins": [0.3, 0.6], "labels": ["low", "medium", "high"]}},
                "weights": {"runoff": 2.0}}"#,
        )
        .unwrap();
        assert_eq!(ok.indicators["runoff"].n_classes(), 3);
        assert_eq!(ok.weights.unwrap()["runoff"], 2.0);

        let err = ScoringConfig::from_json(r#"{"indicators": {"erosion": {"bins": [0.6, 0.3], "labels": ["a", "b", "c"]}}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidThresholds { ref name, .. } if name == "erosion"));
    }

    #[test]
    fn recharge_document() {
        let t = parse_recharge_thresholds(
            r#"{"recharge": {"high": {"awc_min": 120, "slope_max": 4}, "medium": {"awc_min": 40, "slope_max": 12}}}"#,
        )
        .unwrap();
        assert_eq!(t.high.awc_min, 120.0);
        assert_eq!(t.medium.slope_max, 12.0);
        assert!(parse_recharge_thresholds(r#"{"recharge": {"high": {}}}"#).is_err());
    }

    #[test]
    fn site_layers_resolve_and_require() {
        let mut layers: SiteLayers = serde_json::from_str(r#"{"dem": "dem.tif", "clc": "/data/clc.geojson"}"#).unwrap();
        layers.resolve(Path::new("/sites/a"));
        assert_eq!(layers.require("dem").unwrap(), Path::new("/sites/a/dem.tif"));
        assert_eq!(layers.require("clc").unwrap(), Path::new("/data/clc.geojson"));
        let err = layers.require("awc").unwrap_err();
        assert!(matches!(err, Error::MissingLayer("awc")));
    }
}
