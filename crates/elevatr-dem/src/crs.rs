//! Coordinate reference systems and coordinate conversion.
//!
//! CRS identifiers are EPSG codes validated against the `crs-definitions`
//! database. WGS84 <-> Web Mercator, the pair the tile pipeline lives on,
//! uses the closed-form spherical Mercator equations; every other pair is
//! projected with `proj4rs`.

use crate::bbox::BoundingBox;
use crate::{DemError, Result};
use proj4rs::proj::Proj;
use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;
use std::str::FromStr;

/// Radius of the Web Mercator sphere in metres.
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Half the width of the Web Mercator square (πR), in metres.
pub const WEB_MERCATOR_HALF_EXTENT: f64 = PI * WEB_MERCATOR_RADIUS;

/// Latitude where the Web Mercator square ends (arctan(sinh(π))).
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    epsg: u16,
}

impl Crs {
    /// WGS84 geographic coordinates (EPSG:4326).
    pub const WGS84: Crs = Crs { epsg: 4326 };

    /// Web Mercator (EPSG:3857), the native grid of the terrain tiles.
    pub const WEB_MERCATOR: Crs = Crs { epsg: 3857 };

    /// Look up an EPSG code, failing if it is not in the database.
    pub fn from_epsg(code: u16) -> Result<Self> {
        if crs_definitions::from_code(code).is_none() {
            return Err(DemError::InvalidCrs(format!(
                "EPSG:{code} is not in the crs-definitions database"
            )));
        }
        Ok(Self { epsg: code })
    }

    /// Parse `EPSG:<code>` (case-insensitive) or a bare numeric code.
    pub fn parse(identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => {
                return Err(DemError::InvalidCrs(format!(
                    "unsupported CRS authority in {identifier:?}, expected EPSG:<code>"
                )))
            }
            None => trimmed,
        };
        let code: u16 = code
            .trim()
            .parse()
            .map_err(|_| DemError::InvalidCrs(format!("cannot parse CRS identifier {identifier:?}")))?;
        Self::from_epsg(code)
    }

    /// The EPSG code.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// Whether coordinates in this CRS are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        proj_string(self.epsg).map_or(self.epsg == 4326, |p| p.contains("+proj=longlat"))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn proj_string(epsg: u16) -> Option<&'static str> {
    crs_definitions::from_code(epsg).map(|def| def.proj4)
}

/// Forward spherical Mercator: lon/lat degrees to metres.
///
/// Latitude is clamped to the Mercator square so the poles stay finite.
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse spherical Mercator: metres to lon/lat degrees.
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

enum Method {
    Identity,
    LonLatToMercator,
    MercatorToLonLat,
    Proj {
        source: Box<Proj>,
        target: Box<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

/// Point transformer between two CRSs.
///
/// Projection definitions are parsed once, so a transformer can be reused
/// for every pixel of a reprojection.
pub struct CrsTransformer {
    source: Crs,
    target: Crs,
    method: Method,
}

impl fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl CrsTransformer {
    /// Create a transformer from `source` to `target`.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        let method = match (source.epsg, target.epsg) {
            (s, t) if s == t => Method::Identity,
            (4326, 3857) => Method::LonLatToMercator,
            (3857, 4326) => Method::MercatorToLonLat,
            _ => Method::Proj {
                source: Box::new(load_proj(source)?),
                target: Box::new(load_proj(target)?),
                source_geographic: source.is_geographic(),
                target_geographic: target.is_geographic(),
            },
        };
        Ok(Self {
            source,
            target,
            method,
        })
    }

    /// Source CRS.
    pub fn source(&self) -> Crs {
        self.source
    }

    /// Target CRS.
    pub fn target(&self) -> Crs {
        self.target
    }

    /// Transform a single point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match &self.method {
            Method::Identity => Ok((x, y)),
            Method::LonLatToMercator => Ok(lon_lat_to_mercator(x, y)),
            Method::MercatorToLonLat => Ok(mercator_to_lon_lat(x, y)),
            Method::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                // proj4rs works in radians for geographic coordinates
                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
                    DemError::InvalidCrs(format!(
                        "transform from {} to {} failed: {e:?}",
                        self.source, self.target
                    ))
                })?;
                if *target_geographic {
                    Ok((point.0.to_degrees(), point.1.to_degrees()))
                } else {
                    Ok((point.0, point.1))
                }
            }
        }
    }

    /// Transform a bounding box through its two defining corners.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        let (x0, y0) = self.transform(bbox.min_x, bbox.min_y)?;
        let (x1, y1) = self.transform(bbox.max_x, bbox.max_y)?;
        Ok(BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)))
    }
}

fn load_proj(crs: Crs) -> Result<Proj> {
    let definition = proj_string(crs.epsg).ok_or_else(|| {
        DemError::InvalidCrs(format!("{crs} is not in the crs-definitions database"))
    })?;
    Proj::from_proj_string(definition)
        .map_err(|e| DemError::InvalidCrs(format!("invalid projection {crs}: {e:?}")))
}

/// Convert a bounding box between two CRSs by transforming its corners.
pub fn transform_bbox(bbox: &BoundingBox, source: Crs, target: Crs) -> Result<BoundingBox> {
    CrsTransformer::new(source, target)?.transform_bbox(bbox)
}
