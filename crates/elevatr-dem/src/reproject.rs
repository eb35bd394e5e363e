//! Raster reprojection with nearest-neighbour resampling.

use crate::bbox::BoundingBox;
use crate::crs::{Crs, CrsTransformer};
use crate::raster::{RasterBuffer, DEFAULT_NODATA};
use crate::transform::GeoTransform;
use crate::{DemError, Result};
use tracing::debug;

/// Points sampled along each raster edge when computing the output extent.
const EDGE_SAMPLES: usize = 21;

/// Output grid for a reprojection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// Default output grid for reprojecting a `width` x `height` raster.
///
/// The extent is the envelope of the densified source perimeter. Pixels are
/// square and sized so the output keeps the source's pixel count along the
/// diagonal.
pub fn default_grid(
    transformer: &CrsTransformer,
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> Result<TargetGrid> {
    // A zero-sized source still needs a finite pixel size
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);

    let mut envelope = BoundingBox::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    );
    let mut found = false;
    let last = (EDGE_SAMPLES - 1) as f64;
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / last;
        let edge_points = [(t * w, 0.0), (t * w, h), (0.0, t * h), (w, t * h)];
        for (col, row) in edge_points {
            let (x, y) = transform.pixel_to_geo(col, row);
            let Ok((x, y)) = transformer.transform(x, y) else {
                continue;
            };
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            envelope.min_x = envelope.min_x.min(x);
            envelope.min_y = envelope.min_y.min(y);
            envelope.max_x = envelope.max_x.max(x);
            envelope.max_y = envelope.max_y.max(y);
            found = true;
        }
    }

    if !found || envelope.width() <= 0.0 || envelope.height() <= 0.0 {
        return Err(DemError::InvalidCrs(format!(
            "raster extent cannot be represented in {}",
            transformer.target()
        )));
    }

    let resolution = envelope.width().hypot(envelope.height()) / w.hypot(h);
    let out_width = if width == 0 { 0 } else { (envelope.width() / resolution).ceil().max(1.0) as usize };
    let out_height = if height == 0 { 0 } else { (envelope.height() / resolution).ceil().max(1.0) as usize };

    Ok(TargetGrid {
        transform: GeoTransform::from_origin(envelope.min_x, envelope.max_y, resolution, resolution),
        width: out_width,
        height: out_height,
    })
}

/// Reproject a raster to `dst_crs`.
///
/// Reprojecting to the raster's own CRS returns an identical copy. Output
/// pixels whose centres fall outside the source get the nodata value.
pub fn reproject(buffer: &RasterBuffer, dst_crs: &Crs) -> Result<RasterBuffer> {
    let meta = buffer.meta();
    let src_crs = meta.crs();
    if src_crs == *dst_crs {
        debug!("Raster already in {}, nothing to reproject", dst_crs);
        return Ok(buffer.clone());
    }

    let forward = CrsTransformer::new(src_crs, *dst_crs)?;
    let inverse = CrsTransformer::new(*dst_crs, src_crs)?;
    let src_transform = meta.transform();
    let grid = default_grid(&forward, &src_transform, meta.width(), meta.height())?;

    debug!(
        "Reprojecting {}x{} raster from {} to {} ({}x{})",
        meta.width(),
        meta.height(),
        src_crs,
        dst_crs,
        grid.width,
        grid.height
    );

    let nodata = meta.nodata().unwrap_or(DEFAULT_NODATA);
    let mut data = vec![nodata as f32; grid.width * grid.height];

    for row in 0..grid.height {
        for col in 0..grid.width {
            let (x, y) = grid.transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
            let Ok((sx, sy)) = inverse.transform(x, y) else {
                continue;
            };
            let Some((src_col, src_row)) = src_transform.geo_to_pixel(sx, sy) else {
                continue;
            };
            if !(src_col >= 0.0 && src_row >= 0.0) {
                continue;
            }
            if let Some(value) = buffer.get(src_row.floor() as usize, src_col.floor() as usize) {
                data[row * grid.width + col] = value;
            }
        }
    }

    let out_meta = meta
        .with_crs_grid(*dst_crs, grid.transform, grid.width, grid.height)
        .with_nodata(Some(nodata));
    RasterBuffer::new(data, out_meta)
}
