//! Download size estimate used before asking for confirmation.

use crate::bbox::BoundingBox;
use crate::tiles::{resolve_tiles, TILE_SIZE_PX};

/// Decoded size of one terrain tile (512 x 512 float32 samples).
pub const BYTES_PER_TILE: u64 = TILE_SIZE_PX as u64 * TILE_SIZE_PX as u64 * 4;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Estimated size in GB of `tile_count` tiles.
pub fn estimate_size_gb(tile_count: usize) -> f64 {
    tile_count as f64 * BYTES_PER_TILE as f64 / BYTES_PER_GB
}

/// Estimated size in GB of all tiles covering a WGS84 box at `zoom`.
pub fn estimate_bbox_size_gb(bbox: &BoundingBox, zoom: u8) -> f64 {
    estimate_size_gb(resolve_tiles(bbox, zoom).len())
}
