//! Coordinate reference systems and point transforms.
//!
//! The canonical analysis frame is geographic WGS84 (EPSG:4326). Transforms
//! between EPSG codes go through `proj4rs`; the common web-mercator case uses
//! closed-form math instead.

use std::f64::consts::PI;
use std::fmt;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const EPSG_WGS84: u32 = 4326;
const EPSG_WEB_MERCATOR: u32 = 3857;

/// Half the web-mercator world extent in metres.
const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// A CRS identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// Geographic WGS84, the analysis CRS.
    pub const WGS84: Crs = Crs { epsg: EPSG_WGS84 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg == EPSG_WGS84
    }

    /// Axis units are degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4258 | 4269 | 4283 | 4167 | 4617 | 4674)
    }

    /// Parse an identifier such as `EPSG:3035`, `epsg:4326` or an OGC URN
    /// (`urn:ogc:def:crs:EPSG::3035`). `CRS84` maps to WGS84.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.ends_with("CRS84") {
            return Some(Self::WGS84);
        }
        let lower = s.to_ascii_lowercase();
        let idx = lower.rfind("epsg")?;
        let code = s[idx + 4..].trim_start_matches(':');
        code.parse().ok().map(Self::from_epsg)
    }

    /// PROJ definition string for this code, if the code is known.
    pub fn proj_string(&self) -> Option<String> {
        let code = self.epsg;
        let s = match code {
            4326 => "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs".to_string(),
            4258 | 4617 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
            4269 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
            3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
                .to_string(),
            3035 => "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 \
                     +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
                .to_string(),
            2154 => "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
                     +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
                .to_string(),
            27700 => "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
                      +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 \
                      +units=m +no_defs"
                .to_string(),
            32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", code - 32600),
            32701..=32760 => {
                format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", code - 32700)
            }
            25828..=25838 => format!(
                "+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
                code - 25800
            ),
            _ => return None,
        };
        Some(s)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

#[inline]
fn merc_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 180.0 / HALF_EARTH;
    let lat = (2.0 * (y * PI / HALF_EARTH).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

#[inline]
fn lonlat_to_merc(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon * HALF_EARTH / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * HALF_EARTH / PI;
    (x, y)
}

enum Strategy {
    Identity,
    MercToGeo,
    GeoToMerc,
    Proj {
        source: Box<Proj>,
        target: Box<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

/// Reusable point transform between two CRSs.
pub struct CoordTransformer {
    source: Crs,
    target: Crs,
    strategy: Strategy,
}

impl fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        let strategy = if source == target {
            Strategy::Identity
        } else if source.epsg == EPSG_WEB_MERCATOR && target.is_wgs84() {
            Strategy::MercToGeo
        } else if source.is_wgs84() && target.epsg == EPSG_WEB_MERCATOR {
            Strategy::GeoToMerc
        } else {
            let src = source.proj_string().ok_or(Error::UnsupportedCrs(source.epsg))?;
            let dst = target.proj_string().ok_or(Error::UnsupportedCrs(target.epsg))?;
            let source_proj = Proj::from_proj_string(&src)
                .map_err(|e| Error::Transform(format!("invalid projection {source}: {e:?}")))?;
            let target_proj = Proj::from_proj_string(&dst)
                .map_err(|e| Error::Transform(format!("invalid projection {target}: {e:?}")))?;
            Strategy::Proj {
                source: Box::new(source_proj),
                target: Box::new(target_proj),
                source_geographic: source.is_geographic(),
                target_geographic: target.is_geographic(),
            }
        };
        Ok(Self { source, target, strategy })
    }

    /// Transformer from `source` into the WGS84 analysis frame.
    pub fn to_wgs84(source: Crs) -> Result<Self> {
        Self::new(source, Crs::WGS84)
    }

    /// Transformer from WGS84 into `target`.
    pub fn from_wgs84(target: Crs) -> Result<Self> {
        Self::new(Crs::WGS84, target)
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn target(&self) -> Crs {
        self.target
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.strategy, Strategy::Identity)
    }

    /// Transform one `(x, y)` pair. Geographic coordinates are `(lon, lat)` in degrees.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match &self.strategy {
            Strategy::Identity => Ok((x, y)),
            Strategy::MercToGeo => Ok(merc_to_lonlat(x, y)),
            Strategy::GeoToMerc => Ok(lonlat_to_merc(x, y)),
            Strategy::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                let (in_x, in_y) = if *source_geographic {
                    (x.to_radians(), y.to_radians())
                } else {
                    (x, y)
                };
                let mut point = (in_x, in_y, 0.0);
                transform(source, target, &mut point)
                    .map_err(|e| Error::Transform(format!("{} -> {}: {e:?}", self.source, self.target)))?;
                let out = if *target_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };
                if out.0.is_finite() && out.1.is_finite() {
                    Ok(out)
                } else {
                    Err(Error::Transform(format!(
                        "{} -> {}: non-finite result for ({x}, {y})",
                        self.source, self.target
                    )))
                }
            }
        }
    }

    /// Transform an axis-aligned box by densifying its edges, returning the
    /// envelope `(min_x, min_y, max_x, max_y)` in the target CRS.
    pub fn transform_bounds(&self, bounds: (f64, f64, f64, f64)) -> Result<(f64, f64, f64, f64)> {
        if self.is_identity() {
            return Ok(bounds);
        }
        const STEPS: usize = 20;
        let (x0, y0, x1, y1) = bounds;
        let mut env = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = x0 + (x1 - x0) * t;
            let y = y0 + (y1 - y0) * t;
            for (px, py) in [(x, y0), (x, y1), (x0, y), (x1, y)] {
                let (tx, ty) = self.transform(px, py)?;
                env.0 = env.0.min(tx);
                env.1 = env.1.min(ty);
                env.2 = env.2.max(tx);
                env.3 = env.3.max(ty);
            }
        }
        Ok(env)
    }
}
