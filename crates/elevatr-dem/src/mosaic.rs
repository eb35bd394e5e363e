//! Mosaicking of tile rasters into a single grid.

use crate::crs::Crs;
use crate::geotiff;
use crate::raster::{RasterBuffer, RasterMeta, DEFAULT_NODATA};
use crate::transform::GeoTransform;
use crate::{DemError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Merge GeoTIFF files into one raster.
///
/// See [`merge_buffers`] for the compositing rules.
pub fn merge<P: AsRef<Path>>(paths: &[P]) -> Result<RasterBuffer> {
    merge_with_nodata(paths, DEFAULT_NODATA)
}

/// [`merge`] with the nodata used when the first file declares none.
pub fn merge_with_nodata<P: AsRef<Path>>(paths: &[P], fallback_nodata: f64) -> Result<RasterBuffer> {
    if paths.is_empty() {
        return Err(DemError::NoTilesToMerge);
    }
    let buffers = paths
        .iter()
        .map(geotiff::read_geotiff)
        .collect::<Result<Vec<_>>>()?;
    merge_buffers_with_nodata(&buffers, fallback_nodata)
}

/// Merge in-memory rasters into one Web Mercator raster.
///
/// The output covers the union of the input extents at the first input's
/// resolution. Where inputs overlap, the earliest one wins; an input's
/// nodata samples never overwrite. Pixels no input covers are set to the
/// output nodata (the first input's nodata, or [`DEFAULT_NODATA`]).
pub fn merge_buffers(buffers: &[RasterBuffer]) -> Result<RasterBuffer> {
    merge_buffers_with_nodata(buffers, DEFAULT_NODATA)
}

/// [`merge_buffers`] with the nodata used when the first input declares none.
pub fn merge_buffers_with_nodata(buffers: &[RasterBuffer], fallback_nodata: f64) -> Result<RasterBuffer> {
    let first = buffers.first().ok_or(DemError::NoTilesToMerge)?;
    let first_meta = first.meta();
    let x_res = first_meta.transform().x_res();
    let y_res = first_meta.transform().y_res();
    if !(x_res > 0.0 && y_res > 0.0) {
        return Err(DemError::InvalidGeoTiff(format!(
            "cannot merge rasters with pixel size {x_res}x{y_res}"
        )));
    }

    let extent = buffers
        .iter()
        .skip(1)
        .fold(first.bounds(), |acc, b| acc.union(&b.bounds()));
    let width = (extent.width() / x_res).round().max(0.0) as usize;
    let height = (extent.height() / y_res).round().max(0.0) as usize;
    let transform = GeoTransform::from_origin(extent.min_x, extent.max_y, x_res, y_res);
    let nodata = first_meta.nodata().unwrap_or(fallback_nodata);

    debug!(
        "Merging {} raster(s) into a {}x{} mosaic",
        buffers.len(),
        width,
        height
    );

    let mut data = vec![nodata as f32; width * height];
    let mut written = vec![false; width * height];

    for buffer in buffers {
        let meta = buffer.meta();
        if meta.crs() != Crs::WEB_MERCATOR {
            warn!("Merging a {} raster as if it were {}", meta.crs(), Crs::WEB_MERCATOR);
        }
        let src_transform = meta.transform();
        let bounds = buffer.bounds();

        // Output pixels whose centres can fall inside this input
        let col_start = ((bounds.min_x - extent.min_x) / x_res).floor().max(0.0) as usize;
        let col_end = (((bounds.max_x - extent.min_x) / x_res).ceil().max(0.0) as usize).min(width);
        let row_start = ((extent.max_y - bounds.max_y) / y_res).floor().max(0.0) as usize;
        let row_end = (((extent.max_y - bounds.min_y) / y_res).ceil().max(0.0) as usize).min(height);

        let mut copied = 0usize;
        for row in row_start..row_end {
            for col in col_start..col_end {
                let idx = row * width + col;
                if written[idx] {
                    continue;
                }
                let (x, y) = transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
                let Some((src_col, src_row)) = src_transform.geo_to_pixel(x, y) else {
                    continue;
                };
                if src_col < 0.0 || src_row < 0.0 {
                    continue;
                }
                let Some(value) = buffer.get(src_row.floor() as usize, src_col.floor() as usize) else {
                    continue;
                };
                if meta.is_nodata(value) {
                    continue;
                }
                data[idx] = value;
                written[idx] = true;
                copied += 1;
            }
        }
        debug!("Copied {} pixels from a {}x{} input", copied, meta.width(), meta.height());
    }

    let tags = merge_tags(buffers.iter().map(|b| b.meta().tags()));
    let meta = RasterMeta::new(Crs::WEB_MERCATOR, transform, width, height)
        .with_dtype(first_meta.dtype())
        .with_nodata(Some(nodata))
        .with_tags(tags);
    RasterBuffer::new(data, meta)
}

/// Union of comma-separated tag values, per key.
///
/// Each value is split on commas and trimmed; the distinct entries are
/// sorted and re-joined with `,`.
fn merge_tags<'a>(
    tag_maps: impl Iterator<Item = &'a BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for tags in tag_maps {
        for (key, value) in tags {
            let entries = merged.entry(key.clone()).or_default();
            entries.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
    }
    merged
        .into_iter()
        .map(|(key, entries)| (key, entries.into_iter().collect::<Vec<_>>().join(",")))
        .collect()
}
