//! In-memory single-band rasters.
//!
//! A [`RasterBuffer`] is the unit passed between pipeline stages: row-major
//! `f32` samples (north to south, west to east) plus immutable [`RasterMeta`].
//! [`Raster`] is the value handed back to callers; it owns one buffer and
//! derives bounds and resolution from it.

use crate::bbox::BoundingBox;
use crate::crs::Crs;
use crate::geotiff::{self, Compression};
use crate::transform::GeoTransform;
use crate::{DemError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Nodata written when no source declares one.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Sample type of the file a raster was decoded from.
///
/// Samples are always held as `f32` in memory; this records the on-disk type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::U32 => "uint32",
            SampleType::U64 => "uint64",
            SampleType::I8 => "int8",
            SampleType::I16 => "int16",
            SampleType::I32 => "int32",
            SampleType::I64 => "int64",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// Georeferencing and descriptive metadata of a raster.
///
/// Values are never mutated in place; the `with_*` methods return a modified
/// copy so that transform, CRS and grid size always change together.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    crs: Crs,
    transform: GeoTransform,
    width: usize,
    height: usize,
    count: usize,
    dtype: SampleType,
    nodata: Option<f64>,
    tags: BTreeMap<String, String>,
}

impl RasterMeta {
    /// Single-band `f32` metadata with no nodata and no tags.
    pub fn new(crs: Crs, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs,
            transform,
            width,
            height,
            count: 1,
            dtype: SampleType::F32,
            nodata: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Band count (always 1).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn dtype(&self) -> SampleType {
        self.dtype
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Provenance tags, e.g. `imagery_sources`.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Number of samples the grid holds.
    pub fn len(&self) -> usize {
        self.width * self.height * self.count
    }

    /// Whether the grid has no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map extent of the grid.
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Whether `value` is this raster's nodata marker.
    pub fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata as f32,
            None => false,
        }
    }

    /// Same CRS, new transform and size.
    pub fn with_grid(&self, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            transform,
            width,
            height,
            ..self.clone()
        }
    }

    /// New CRS, transform and size.
    pub fn with_crs_grid(&self, crs: Crs, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs,
            ..self.with_grid(transform, width, height)
        }
    }

    pub fn with_nodata(&self, nodata: Option<f64>) -> Self {
        Self {
            nodata,
            ..self.clone()
        }
    }

    pub fn with_dtype(&self, dtype: SampleType) -> Self {
        Self {
            dtype,
            ..self.clone()
        }
    }

    pub fn with_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut tags = self.tags.clone();
        tags.insert(key.into(), value.into());
        Self {
            tags,
            ..self.clone()
        }
    }

    pub fn with_tags(&self, tags: BTreeMap<String, String>) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }
}

/// Samples plus metadata, with the sample count checked against the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    data: Vec<f32>,
    meta: RasterMeta,
}

impl RasterBuffer {
    /// Pair `data` with `meta`, failing if the lengths disagree.
    pub fn new(data: Vec<f32>, meta: RasterMeta) -> Result<Self> {
        if data.len() != meta.len() {
            return Err(DemError::RasterShape {
                actual: data.len(),
                width: meta.width,
                height: meta.height,
                count: meta.count,
            });
        }
        Ok(Self { data, meta })
    }

    /// A buffer of `meta.len()` copies of `value`.
    pub fn filled(meta: RasterMeta, value: f32) -> Self {
        Self {
            data: vec![value; meta.len()],
            meta,
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn meta(&self) -> &RasterMeta {
        &self.meta
    }

    pub fn bounds(&self) -> BoundingBox {
        self.meta.bounds()
    }

    /// Sample at (`row`, `col`), `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.meta.height || col >= self.meta.width {
            return None;
        }
        self.data.get(row * self.meta.width + col).copied()
    }

    /// Split into samples and metadata.
    pub fn into_parts(self) -> (Vec<f32>, RasterMeta) {
        (self.data, self.meta)
    }
}

/// Summary statistics over the valid samples of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    /// Samples that are neither nodata nor NaN.
    pub valid_count: usize,
}

/// An elevation raster returned to callers.
#[derive(Debug, Clone)]
pub struct Raster {
    buffer: RasterBuffer,
    bounds: BoundingBox,
    resolution: (f64, f64),
}

impl Raster {
    /// Wrap a buffer, deriving bounds and resolution.
    pub fn new(buffer: RasterBuffer) -> Self {
        let meta = buffer.meta();
        let bounds = meta.bounds();
        let resolution = (meta.transform().x_res(), meta.transform().y_res());
        Self {
            buffer,
            bounds,
            resolution,
        }
    }

    pub fn data(&self) -> &[f32] {
        self.buffer.data()
    }

    pub fn meta(&self) -> &RasterMeta {
        self.buffer.meta()
    }

    pub fn crs(&self) -> Crs {
        self.meta().crs()
    }

    pub fn transform(&self) -> GeoTransform {
        self.meta().transform()
    }

    pub fn width(&self) -> usize {
        self.meta().width()
    }

    pub fn height(&self) -> usize {
        self.meta().height()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.meta().nodata()
    }

    /// Extent in the raster CRS.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Pixel size `(x, y)` in CRS units.
    pub fn resolution(&self) -> (f64, f64) {
        self.resolution
    }

    /// Sample at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.buffer.get(row, col)
    }

    /// Rows as slices, north to south.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks() panics on zero
        self.data().chunks(self.width().max(1))
    }

    /// Owned copy of the samples.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data().to_vec()
    }

    pub fn into_buffer(self) -> RasterBuffer {
        self.buffer
    }

    /// Reproject in place and recompute bounds and resolution.
    pub fn reproject(&mut self, crs: &Crs) -> Result<()> {
        let buffer = crate::reproject::reproject(&self.buffer, crs)?;
        *self = Self::new(buffer);
        Ok(())
    }

    /// Write as a single-band GeoTIFF.
    ///
    /// `compression` is one of `none`, `lzw`, `packbits`, `deflate`, `zstd`
    /// or `lzma` (case-insensitive) and is checked before the file is created.
    pub fn to_tif<P: AsRef<Path>>(&self, path: P, compression: &str) -> Result<()> {
        let compression: Compression = compression.parse()?;
        geotiff::write_geotiff(&self.buffer, path, compression)
    }

    /// Min, max and mean over valid samples, `None` if there are none.
    pub fn statistics(&self) -> Option<RasterStatistics> {
        let meta = self.meta();
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        let mut valid_count = 0_usize;
        for &v in self.data() {
            if v.is_nan() || meta.is_nodata(v) {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            valid_count += 1;
        }
        (valid_count > 0).then(|| RasterStatistics {
            min,
            max,
            mean: sum / valid_count as f64,
            valid_count,
        })
    }
}

impl From<RasterBuffer> for Raster {
    fn from(buffer: RasterBuffer) -> Self {
        Self::new(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_2x3() -> RasterMeta {
        RasterMeta::new(
            Crs::WEB_MERCATOR,
            GeoTransform::from_origin(100.0, 200.0, 10.0, 10.0),
            3,
            2,
        )
    }

    #[test]
    fn test_buffer_rejects_wrong_length() {
        let err = RasterBuffer::new(vec![0.0; 5], meta_2x3()).unwrap_err();
        assert!(matches!(
            err,
            DemError::RasterShape {
                actual: 5,
                width: 3,
                height: 2,
                count: 1
            }
        ));
    }

    #[test]
    fn test_meta_with_constructors() {
        let meta = meta_2x3();
        let moved = meta.with_grid(GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0), 5, 5);
        assert_eq!(moved.width(), 5);
        assert_eq!(moved.crs(), Crs::WEB_MERCATOR);
        assert_eq!(meta.width(), 3);

        let tagged = meta.with_tag("imagery_sources", "a.tif").with_nodata(Some(-1.0));
        assert_eq!(tagged.tags().get("imagery_sources").map(String::as_str), Some("a.tif"));
        assert!(tagged.is_nodata(-1.0));
        assert!(!meta.is_nodata(-1.0));
    }

    #[test]
    fn test_nan_nodata() {
        let meta = meta_2x3().with_nodata(Some(f64::NAN));
        assert!(meta.is_nodata(f32::NAN));
        assert!(!meta.is_nodata(0.0));
    }

    #[test]
    fn test_raster_derived_fields() {
        let buffer = RasterBuffer::new((0..6).map(|v| v as f32).collect(), meta_2x3()).unwrap();
        let raster = Raster::new(buffer);
        assert_eq!(raster.bounds(), BoundingBox::new(100.0, 180.0, 130.0, 200.0));
        assert_eq!(raster.resolution(), (10.0, 10.0));
        assert_eq!(raster.get(1, 2), Some(5.0));
        assert_eq!(raster.get(2, 0), None);

        let rows: Vec<&[f32]> = raster.rows().collect();
        assert_eq!(rows, vec![&[0.0, 1.0, 2.0][..], &[3.0, 4.0, 5.0][..]]);
    }

    #[test]
    fn test_statistics_skip_nodata() {
        let meta = meta_2x3().with_nodata(Some(-9999.0));
        let buffer = RasterBuffer::new(vec![1.0, 2.0, -9999.0, 3.0, f32::NAN, 6.0], meta).unwrap();
        let stats = Raster::new(buffer).statistics().unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.valid_count, 4);
        assert!((stats.mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_empty() {
        let meta = meta_2x3().with_grid(GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0), 0, 0);
        let raster = Raster::new(RasterBuffer::new(Vec::new(), meta).unwrap());
        assert!(raster.statistics().is_none());
        assert_eq!(raster.rows().count(), 0);
    }
}
