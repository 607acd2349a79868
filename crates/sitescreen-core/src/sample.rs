use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A sampled cell value: a finite number or an explicit missing marker.
///
/// NaN, infinities, nodata sentinels and out-of-bounds reads all collapse to
/// `Missing` here, so nothing downstream handles more than one convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sample {
    #[default]
    Missing,
    Value(f64),
}

impl Sample {
    /// Mask a raw cell read against the layer's nodata sentinel.
    /// Comparison with the sentinel is exact.
    #[inline]
    pub fn from_raw(raw: f64, nodata: Option<f64>) -> Self {
        if !raw.is_finite() {
            return Sample::Missing;
        }
        match nodata {
            Some(nd) if raw == nd => Sample::Missing,
            _ => Sample::Value(raw),
        }
    }

    /// Wrap a computed value, rejecting non-finite results.
    #[inline]
    pub fn finite(v: f64) -> Self {
        if v.is_finite() {
            Sample::Value(v)
        } else {
            Sample::Missing
        }
    }

    #[inline]
    pub fn value(self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(v),
            Sample::Missing => None,
        }
    }

    #[inline]
    pub fn is_missing(self) -> bool {
        matches!(self, Sample::Missing)
    }

    #[inline]
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Sample::Value(v) => Sample::finite(f(v)),
            Sample::Missing => Sample::Missing,
        }
    }

    /// Raw representation for writers that need a numeric sentinel.
    #[inline]
    pub fn or_nodata(self, nodata: f64) -> f64 {
        self.value().unwrap_or(nodata)
    }
}

impl From<Option<f64>> for Sample {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Sample::Missing, Sample::finite)
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.into())
    }
}

/// Convert a raw band into samples with one layer-specific nodata sentinel.
pub fn mask_band(raw: &[f64], nodata: Option<f64>) -> Vec<Sample> {
    raw.iter().map(|&v| Sample::from_raw(v, nodata)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodata_and_nan_are_missing() {
        assert_eq!(Sample::from_raw(-9999.0, Some(-9999.0)), Sample::Missing);
        assert_eq!(Sample::from_raw(f64::NAN, None), Sample::Missing);
        assert_eq!(Sample::from_raw(f64::INFINITY, Some(0.0)), Sample::Missing);
        assert_eq!(Sample::from_raw(12.5, Some(-9999.0)), Sample::Value(12.5));
    }

    #[test]
    fn nodata_comparison_is_exact() {
        // A value one ulp away from the sentinel is valid data.
        let near = f64::from_bits((-9999.0f64).to_bits() + 1);
        assert_eq!(Sample::from_raw(near, Some(-9999.0)), Sample::Value(near));
    }

    #[test]
    fn serializes_missing_as_null() {
        let json = serde_json::to_string(&vec![Sample::Value(1.5), Sample::Missing]).unwrap();
        assert_eq!(json, "[1.5,null]");
        let back: Vec<Sample> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Sample::Value(1.5), Sample::Missing]);
    }
}
