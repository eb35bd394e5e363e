//! Axis-aligned bounding boxes.

use crate::{DemError, Result};

/// An axis-aligned bounding box `(min_x, min_y, max_x, max_y)`.
///
/// The coordinate reference system is implied by context: WGS84 degrees for
/// user input, the raster CRS once converted with [`crate::transform_bbox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// West edge (minimum longitude / easting).
    pub min_x: f64,
    /// South edge (minimum latitude / northing).
    pub min_y: f64,
    /// East edge (maximum longitude / easting).
    pub max_x: f64,
    /// North edge (maximum latitude / northing).
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box from its four edges, without normalization.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a normalized WGS84 bounding box from a
    /// `(min_lon, min_lat, max_lon, max_lat)` tuple, rejecting non-finite or
    /// out-of-range values.
    pub fn from_wgs84(locations: (f64, f64, f64, f64)) -> Result<Self> {
        let (min_lon, min_lat, max_lon, max_lat) = locations;
        let bbox = Self::new(min_lon, min_lat, max_lon, max_lat);

        if ![min_lon, min_lat, max_lon, max_lat].iter().all(|v| v.is_finite()) {
            return Err(DemError::InvalidInput(format!(
                "bounding box must contain only finite numbers, got {bbox:?}"
            )));
        }

        // Wrapping only the east edge would flip the box across the
        // antimeridian and cover nearly every longitude
        if min_lon <= 180.0 && max_lon > 180.0 && max_lon - 360.0 < min_lon {
            return Err(DemError::InvalidInput(format!(
                "bounding box crosses the antimeridian, split it into two requests: {locations:?}"
            )));
        }

        let bbox = bbox.normalized();
        let lon_ok = (-180.0..=180.0).contains(&bbox.min_x) && (-180.0..=180.0).contains(&bbox.max_x);
        let lat_ok = (-90.0..=90.0).contains(&bbox.min_y) && (-90.0..=90.0).contains(&bbox.max_y);
        if !lon_ok || !lat_ok {
            return Err(DemError::InvalidInput(format!(
                "longitude must be between -180 and 180 and latitude between -90 and 90, got {locations:?}"
            )));
        }

        Ok(bbox)
    }

    /// Wrap longitudes above 180 into the [-180, 180] range and order the
    /// edges so that `min <= max` on both axes.
    pub fn normalized(&self) -> Self {
        let wrap = |lon: f64| if lon > 180.0 { lon - 360.0 } else { lon };
        let (x0, x1) = (wrap(self.min_x), wrap(self.max_x));
        Self {
            min_x: x0.min(x1),
            min_y: self.min_y.min(self.max_y),
            max_x: x0.max(x1),
            max_y: self.min_y.max(self.max_y),
        }
    }

    /// Width of the box along the x axis.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the box along the y axis.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if a point is within the box (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if `other` lies entirely within this box, allowing `tolerance`
    /// of slack on every edge.
    pub fn contains(&self, other: &BoundingBox, tolerance: f64) -> bool {
        other.min_x >= self.min_x - tolerance
            && other.min_y >= self.min_y - tolerance
            && other.max_x <= self.max_x + tolerance
            && other.max_y <= self.max_y + tolerance
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl From<BoundingBox> for (f64, f64, f64, f64) {
    fn from(bbox: BoundingBox) -> Self {
        (bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y)
    }
}
