//! Slippy-map tile indexing.
//!
//! Uses the OpenStreetMap Slippy Map tile naming convention:
//! - `z` is the zoom level (0-14 for the AWS terrain tiles)
//! - `x` is the column (0 to 2^z - 1, from west to east)
//! - `y` is the row (0 to 2^z - 1, from north to south)
//!
//! Each tile is a quad-tree leaf of the Web Mercator square; at zoom 12 a
//! 512x512 terrain tile covers ~0.088° (about 9.8 km at the equator).

use crate::bbox::BoundingBox;
use crate::crs::WEB_MERCATOR_HALF_EXTENT;
use std::collections::HashSet;
use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};

/// Minimum valid zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum valid zoom level for AWS elevation tiles.
pub const MAX_ZOOM: u8 = 14;

/// Highest zoom the index math supports without overflowing `u32`.
const MAX_INDEX_ZOOM: u8 = 30;

/// AWS S3 base URL for GeoTIFF elevation tiles.
pub const DEFAULT_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/geotiff";

/// Pixels along each edge of a terrain tile.
pub const TILE_SIZE_PX: u32 = 512;

/// OSM-style tile coordinates (z, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level.
    pub z: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    ///
    /// # Panics
    /// Panics if coordinates are out of range for the zoom level.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        assert!(z <= MAX_INDEX_ZOOM, "zoom {} is too deep", z);
        let max_coord = 1u32 << z;
        assert!(x < max_coord, "x={} out of range for zoom {}", x, z);
        assert!(y < max_coord, "y={} out of range for zoom {}", y, z);
        Self { z, x, y }
    }

    /// Tile containing a longitude/latitude (degrees) at zoom `z`.
    pub fn from_lon_lat(lon: f64, lat: f64, z: u8) -> Self {
        let (x, y) = lonlat_to_tile(lon, lat, z);
        Self { z, x, y }
    }

    /// Number of tiles along each axis at this tile's zoom.
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.z
    }

    /// Geographic bounds of this tile as a WGS84 box.
    pub fn bounds(&self) -> BoundingBox {
        let n = f64::from(self.tiles_per_axis());

        let min_lon = f64::from(self.x) / n * 360.0 - 180.0;
        let max_lon = f64::from(self.x + 1) / n * 360.0 - 180.0;

        // Inverse of the Slippy Map formula
        let max_lat = (PI * (1.0 - 2.0 * f64::from(self.y) / n)).sinh().atan().to_degrees();
        let min_lat = (PI * (1.0 - 2.0 * f64::from(self.y + 1) / n)).sinh().atan().to_degrees();

        BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// Bounds of this tile in Web Mercator metres.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let size = 2.0 * WEB_MERCATOR_HALF_EXTENT / f64::from(self.tiles_per_axis());
        let min_x = -WEB_MERCATOR_HALF_EXTENT + f64::from(self.x) * size;
        let max_y = WEB_MERCATOR_HALF_EXTENT - f64::from(self.y) * size;
        BoundingBox::new(min_x, max_y - size, min_x + size, max_y)
    }

    /// Remote URL of this tile under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}/{}/{}.tif", base_url.trim_end_matches('/'), self.z, self.x, self.y)
    }

    /// Cache file name: `{source}_{z}_{x}_{y}.tif`.
    pub fn cache_file_name(&self, source: &str) -> String {
        format!("{}_{}_{}_{}.tif", source, self.z, self.x, self.y)
    }

    /// Get the cache file path for this tile.
    pub fn cache_path(&self, cache_dir: &Path, source: &str) -> PathBuf {
        cache_dir.join(self.cache_file_name(source))
    }
}

/// Last path segment of a tile server base URL, used to prefix cache files
/// so that tiles from different sources never collide.
pub fn source_name(base_url: &str) -> &str {
    base_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .unwrap_or("tiles")
}

/// Convert a longitude/latitude in degrees to tile numbers at `zoom`.
///
/// Indices are clamped to `[0, 2^zoom - 1]`, so the poles and the
/// antimeridian map onto the outermost tiles instead of overflowing.
pub fn lonlat_to_tile(lon: f64, lat: f64, zoom: u8) -> (u32, u32) {
    debug_assert!(zoom <= MAX_INDEX_ZOOM, "zoom {} is too deep", zoom);
    let lon_rad = lon.to_radians();
    let lat_rad = lat.to_radians();

    let x_frac = (1.0 + lon_rad / PI) / 2.0;
    let y_frac = (1.0 - lat_rad.tan().asinh() / PI) / 2.0;

    let n = f64::from(1u32 << zoom);
    let index = |frac: f64| (frac * n).floor().clamp(0.0, n - 1.0) as u32;

    (index(x_frac), index(y_frac))
}

/// An ordered, deduplicated set of tiles at a single zoom level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSet {
    zoom: u8,
    tiles: Vec<TileCoord>,
}

impl TileSet {
    /// Build a tile set, dropping duplicates while keeping first-seen order.
    pub fn new(zoom: u8, tiles: impl IntoIterator<Item = TileCoord>) -> Self {
        let mut seen = HashSet::new();
        let tiles = tiles.into_iter().filter(|t| seen.insert(*t)).collect();
        Self { zoom, tiles }
    }

    /// Zoom level shared by every tile.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the set holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Iterate over the tiles in order.
    pub fn iter(&self) -> std::slice::Iter<'_, TileCoord> {
        self.tiles.iter()
    }

    /// The tiles as a slice.
    pub fn as_slice(&self) -> &[TileCoord] {
        &self.tiles
    }
}

impl<'a> IntoIterator for &'a TileSet {
    type Item = &'a TileCoord;
    type IntoIter = std::slice::Iter<'a, TileCoord>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles.iter()
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Resolve the minimal set of tiles covering a WGS84 bounding box.
///
/// Tiles are returned row-major: y (north to south) outer, x (west to east)
/// inner.
pub fn resolve_tiles(bbox: &BoundingBox, zoom: u8) -> TileSet {
    let (x0, y0) = lonlat_to_tile(bbox.min_x, bbox.min_y, zoom);
    let (x1, y1) = lonlat_to_tile(bbox.max_x, bbox.max_y, zoom);

    // Tile y grows southward while latitude grows northward
    let (x_min, x_max) = (x0.min(x1), x0.max(x1));
    let (y_min, y_max) = (y0.min(y1), y0.max(y1));

    let tiles = (y_min..=y_max)
        .flat_map(|y| (x_min..=x_max).map(move |x| TileCoord { z: zoom, x, y }));
    TileSet::new(zoom, tiles)
}
