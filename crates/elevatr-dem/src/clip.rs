//! Cropping a raster to a bounding box.

use crate::bbox::BoundingBox;
use crate::crs::{transform_bbox, Crs};
use crate::raster::RasterBuffer;
use crate::{DemError, Result};
use tracing::debug;

/// Slack applied before rounding window edges outwards, so edges that land
/// on a pixel boundary up to float noise do not grab an extra pixel.
const EDGE_TOLERANCE: f64 = 1e-9;

/// A pixel window `[col_off, col_off + width) x [row_off, row_off + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

/// Window of `buffer` covering `bbox`, given in the buffer's CRS.
///
/// The window grows outwards to whole pixels and is clamped to the raster,
/// so a box entirely outside yields a zero-sized window.
pub fn window_for_bounds(buffer: &RasterBuffer, bbox: &BoundingBox) -> Result<Window> {
    let meta = buffer.meta();
    let transform = meta.transform();

    let corners = [
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.max_y),
        (bbox.min_x, bbox.min_y),
        (bbox.max_x, bbox.min_y),
    ];
    let (mut col_min, mut col_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut row_min, mut row_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (col, row) = transform.geo_to_pixel(x, y).ok_or_else(|| {
            DemError::InvalidGeoTiff(format!("raster transform {transform:?} is not invertible"))
        })?;
        col_min = col_min.min(col);
        col_max = col_max.max(col);
        row_min = row_min.min(row);
        row_max = row_max.max(row);
    }

    let clamp = |v: f64, max: usize| v.clamp(0.0, max as f64) as usize;
    let col_start = clamp((col_min + EDGE_TOLERANCE).floor(), meta.width());
    let col_stop = clamp((col_max - EDGE_TOLERANCE).ceil(), meta.width()).max(col_start);
    let row_start = clamp((row_min + EDGE_TOLERANCE).floor(), meta.height());
    let row_stop = clamp((row_max - EDGE_TOLERANCE).ceil(), meta.height()).max(row_start);

    Ok(Window {
        col_off: col_start,
        row_off: row_start,
        width: col_stop - col_start,
        height: row_stop - row_start,
    })
}

/// Copy a window out of `buffer`, with the transform shifted to match.
pub fn read_window(buffer: &RasterBuffer, window: Window) -> Result<RasterBuffer> {
    let meta = buffer.meta();
    if window.col_off + window.width > meta.width() || window.row_off + window.height > meta.height() {
        return Err(DemError::InvalidInput(format!(
            "window {window:?} exceeds {}x{} raster",
            meta.width(),
            meta.height()
        )));
    }

    let mut data = Vec::with_capacity(window.width * window.height);
    for row in window.row_off..window.row_off + window.height {
        let start = row * meta.width() + window.col_off;
        data.extend_from_slice(&buffer.data()[start..start + window.width]);
    }

    let transform = meta.transform().window_transform(window.col_off, window.row_off);
    RasterBuffer::new(data, meta.with_grid(transform, window.width, window.height))
}

/// Clip a raster to a WGS84 bounding box.
pub fn clip(buffer: &RasterBuffer, bbox_wgs84: &BoundingBox) -> Result<RasterBuffer> {
    let bbox = transform_bbox(bbox_wgs84, Crs::WGS84, buffer.meta().crs())?;
    let window = window_for_bounds(buffer, &bbox)?;
    debug!(
        "Clipping {}x{} raster to window {:?}",
        buffer.meta().width(),
        buffer.meta().height(),
        window
    );
    read_window(buffer, window)
}
