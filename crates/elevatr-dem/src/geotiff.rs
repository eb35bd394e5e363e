//! Single-band GeoTIFF reading and writing.
//!
//! Georeferencing is carried by the standard GeoTIFF tags (pixel scale,
//! tiepoint or full model transformation, GeoKey directory). Nodata and
//! provenance tags use the GDAL conventions so files round-trip through GDAL
//! tools.

use crate::crs::Crs;
use crate::raster::{RasterBuffer, RasterMeta, SampleType};
use crate::transform::GeoTransform;
use crate::{DemError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::str::FromStr;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::compression::{
    Compression as TiffCompression, Deflate, Lzw, Packbits, Uncompressed,
};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use roxmltree::Document;
use tiff::ColorType;
use tracing::{debug, warn};

// GeoTIFF tag IDs
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;

// GDAL private tags
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

/// Tag for a numeric id. Known ids decode to their named variants, so
/// lookups must go through the same mapping.
fn tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Output compression for [`write_geotiff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Lzw,
    Packbits,
    Deflate,
    /// Written with deflate; the encoder has no zstd codec.
    Zstd,
    /// Written with deflate; the encoder has no lzma codec.
    Lzma,
}

impl Compression {
    /// All accepted names.
    pub const NAMES: [&'static str; 6] = ["none", "lzw", "packbits", "deflate", "zstd", "lzma"];

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lzw => "lzw",
            Compression::Packbits => "packbits",
            Compression::Deflate => "deflate",
            Compression::Zstd => "zstd",
            Compression::Lzma => "lzma",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "lzw" => Ok(Compression::Lzw),
            "packbits" => Ok(Compression::Packbits),
            "deflate" => Ok(Compression::Deflate),
            "zstd" => Ok(Compression::Zstd),
            "lzma" => Ok(Compression::Lzma),
            _ => Err(DemError::InvalidInput(format!(
                "invalid compression {s:?}, must be one of {}",
                Compression::NAMES.join(", ")
            ))),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read a single-band GeoTIFF from disk.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<RasterBuffer> {
    let path = path.as_ref();
    debug!("Reading GeoTIFF {}", path.display());
    let file = File::open(path)?;
    read_geotiff_from(BufReader::new(file))
}

/// Read a single-band GeoTIFF from any seekable reader.
pub fn read_geotiff_from<R: Read + Seek>(reader: R) -> Result<RasterBuffer> {
    let mut decoder = Decoder::new(reader)?;

    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(DemError::UnsupportedDataType(format!(
                "expected a single-band raster, got {other:?}"
            )))
        }
    }

    let (width, height) = decoder.dimensions()?;
    let transform = read_transform(&mut decoder)?;
    let crs = read_crs(&mut decoder);
    let nodata = read_nodata(&mut decoder);
    let tags = decoder
        .get_tag_ascii_string(tag(GDAL_METADATA))
        .map(|xml| parse_gdal_metadata(&xml))
        .unwrap_or_default();

    let (data, dtype) = decode_samples(&mut decoder)?;

    let meta = RasterMeta::new(crs, transform, width as usize, height as usize)
        .with_dtype(dtype)
        .with_nodata(nodata)
        .with_tags(tags);
    RasterBuffer::new(data, meta)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Ok(GeoTransform::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint format: [i, j, k, x, y, z], pixel (i, j) sits at map (x, y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            let (x, y) = (tiepoint[3], tiepoint[4]);
            let (sx, sy) = (scale[0], scale[1]);
            return Ok(GeoTransform::from_origin(x - i * sx, y + j * sy, sx, sy));
        }
    }

    Err(DemError::InvalidGeoTiff(
        "missing ModelTransformation or ModelTiepoint/ModelPixelScale tags".to_string(),
    ))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Crs {
    let keys = decoder
        .get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))
        .unwrap_or_default();

    // Header is 4 shorts, then (key, location, count, value) entries
    let mut projected = None;
    let mut geographic = None;
    for entry in keys.chunks_exact(4).skip(1) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }

    match projected.or(geographic).map(Crs::from_epsg) {
        Some(Ok(crs)) => crs,
        Some(Err(e)) => {
            warn!("{e}, assuming {}", Crs::WEB_MERCATOR);
            Crs::WEB_MERCATOR
        }
        None => {
            warn!("GeoTIFF has no EPSG GeoKey, assuming {}", Crs::WEB_MERCATOR);
            Crs::WEB_MERCATOR
        }
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    // GDAL_NODATA is stored as an ASCII string
    decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(Vec<f32>, SampleType)> {
    let result = decoder.read_image()?;

    let decoded = match result {
        DecodingResult::F32(data) => (data, SampleType::F32),
        DecodingResult::F64(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::F64),
        DecodingResult::I16(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::I16),
        DecodingResult::I32(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::I32),
        DecodingResult::U16(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::U16),
        DecodingResult::U32(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::U32),
        DecodingResult::U8(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::U8),
        DecodingResult::I8(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::I8),
        DecodingResult::U64(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::U64),
        DecodingResult::I64(data) => (data.into_iter().map(|v| v as f32).collect(), SampleType::I64),
    };
    Ok(decoded)
}

// ============================================================================
// Writing
// ============================================================================

/// Write a buffer as a single-band float32 GeoTIFF.
///
/// A partially written file is removed if encoding fails.
pub fn write_geotiff<P: AsRef<Path>>(
    buffer: &RasterBuffer,
    path: P,
    compression: Compression,
) -> Result<()> {
    let path = path.as_ref();
    check_writable(buffer)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let written = write_geotiff_to(buffer, &mut writer, compression).and_then(|()| {
        writer.flush()?;
        Ok(())
    });
    if written.is_err() {
        drop(writer);
        let _ = std::fs::remove_file(path);
    }
    written?;

    debug!(
        "Wrote {}x{} GeoTIFF {} ({compression})",
        buffer.meta().width(),
        buffer.meta().height(),
        path.display()
    );
    Ok(())
}

/// Write a buffer as a single-band float32 GeoTIFF to any seekable writer.
pub fn write_geotiff_to<W: Write + Seek>(
    buffer: &RasterBuffer,
    writer: W,
    compression: Compression,
) -> Result<()> {
    check_writable(buffer)?;
    match compression {
        Compression::None => encode(buffer, writer, Uncompressed),
        Compression::Lzw => encode(buffer, writer, Lzw),
        Compression::Packbits => encode(buffer, writer, Packbits),
        Compression::Deflate => encode(buffer, writer, Deflate::default()),
        Compression::Zstd | Compression::Lzma => {
            warn!("{compression} compression is not available, writing deflate instead");
            encode(buffer, writer, Deflate::default())
        }
    }
}

fn check_writable(buffer: &RasterBuffer) -> Result<()> {
    if buffer.meta().is_empty() {
        return Err(DemError::InvalidInput(
            "cannot write a raster with zero width or height".to_string(),
        ));
    }
    Ok(())
}

fn encode<W: Write + Seek, D: TiffCompression>(
    buffer: &RasterBuffer,
    writer: W,
    compression: D,
) -> Result<()> {
    let meta = buffer.meta();
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image_with_compression::<Gray32Float, D>(
        meta.width() as u32,
        meta.height() as u32,
        compression,
    )?;
    write_geo_tags(image.encoder(), meta)?;
    image.write_data(buffer.data())?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    meta: &RasterMeta,
) -> Result<()> {
    let t = meta.transform();

    if t.b == 0.0 && t.d == 0.0 {
        // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
        let pixel_scale = [t.a, -t.e, 0.0];
        dir.write_tag(tag(MODEL_PIXEL_SCALE), &pixel_scale[..])?;

        // ModelTiepoint ties pixel (0, 0) to the top-left corner
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let matrix = [
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let geokeys = geokey_directory(meta.crs());
    dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;

    if let Some(nodata) = meta.nodata() {
        dir.write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())?;
    }

    if !meta.tags().is_empty() {
        let xml = format_gdal_metadata(meta.tags());
        dir.write_tag(tag(GDAL_METADATA), xml.as_str())?;
    }

    Ok(())
}

fn geokey_directory(crs: Crs) -> Vec<u16> {
    let geographic = crs.is_geographic();

    // [KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys]
    let mut keys = vec![1, 1, 0, 3];
    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    let crs_key = if geographic {
        GEOGRAPHIC_TYPE_GEO_KEY
    } else {
        PROJECTED_CS_TYPE_GEO_KEY
    };
    keys.extend_from_slice(&[crs_key, 0, 1, crs.epsg()]);
    keys
}

// ============================================================================
// GDAL metadata XML
// ============================================================================

fn format_gdal_metadata(tags: &BTreeMap<String, String>) -> String {
    let mut xml = String::from("<GDALMetadata>\n");
    for (key, value) in tags {
        xml.push_str(&format!(
            "  <Item name=\"{}\">{}</Item>\n",
            escape_xml(key),
            escape_xml(value)
        ));
    }
    xml.push_str("</GDALMetadata>\n");
    xml
}

/// Dataset-level items of a `<GDALMetadata>` document.
///
/// Band-level items (those with a `sample` attribute) are skipped. A
/// document that does not parse yields no tags.
fn parse_gdal_metadata(xml: &str) -> BTreeMap<String, String> {
    let xml = xml.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Ignoring unreadable GDAL metadata: {e}");
            return BTreeMap::new();
        }
    };

    let tags = doc
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("Item") && node.attribute("sample").is_none())
        .filter_map(|item| {
            let name = item.attribute("name")?;
            let value: String = item
                .children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            Some((name.to_string(), value))
        })
        .collect();
    tags
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::colortype::GrayI16;

    fn sample_buffer() -> RasterBuffer {
        let meta = RasterMeta::new(
            Crs::WEB_MERCATOR,
            GeoTransform::from_origin(-1000.0, 2000.0, 250.0, 125.0),
            3,
            2,
        )
        .with_nodata(Some(-9999.0))
        .with_tag("imagery_sources", "srtm/N00E000.tif, gmted/x.tif");
        RasterBuffer::new(vec![1.5, -2.0, 3.25, -9999.0, 100.0, 8848.0], meta).unwrap()
    }

    #[test]
    fn test_compression_parse() {
        assert_eq!("LZW".parse::<Compression>().unwrap(), Compression::Lzw);
        assert_eq!(" deflate ".parse::<Compression>().unwrap(), Compression::Deflate);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!(matches!(
            "jpeg".parse::<Compression>(),
            Err(DemError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_write_then_read_preserves_georeferencing() {
        let buffer = sample_buffer();
        for compression in [
            Compression::None,
            Compression::Lzw,
            Compression::Packbits,
            Compression::Deflate,
        ] {
            let mut bytes = Cursor::new(Vec::new());
            write_geotiff_to(&buffer, &mut bytes, compression).unwrap();
            bytes.set_position(0);
            let read = read_geotiff_from(bytes).unwrap();
            assert_eq!(read, buffer, "compression {compression}");
        }
    }

    #[test]
    fn test_geographic_crs_round_trip() {
        let meta = RasterMeta::new(
            Crs::WGS84,
            GeoTransform::from_origin(10.0, 50.0, 0.5, 0.5),
            2,
            2,
        );
        let buffer = RasterBuffer::new(vec![1.0, 2.0, 3.0, 4.0], meta).unwrap();
        let mut bytes = Cursor::new(Vec::new());
        write_geotiff_to(&buffer, &mut bytes, Compression::None).unwrap();
        bytes.set_position(0);
        let read = read_geotiff_from(bytes).unwrap();
        assert_eq!(read.meta().crs(), Crs::WGS84);
        assert_eq!(read.meta().nodata(), None);
        assert!(read.meta().tags().is_empty());
    }

    #[test]
    fn test_rejects_empty_raster() {
        let meta = RasterMeta::new(
            Crs::WEB_MERCATOR,
            GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0),
            0,
            4,
        );
        let buffer = RasterBuffer::new(Vec::new(), meta).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tif");
        assert!(matches!(
            write_geotiff(&buffer, &path, Compression::Lzw),
            Err(DemError::InvalidInput(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_rejects_garbage() {
        let bytes = Cursor::new(b"<html>not a tiff</html>".to_vec());
        assert!(read_geotiff_from(bytes).is_err());
    }

    #[test]
    fn test_gdal_metadata_xml() {
        let mut tags = BTreeMap::new();
        tags.insert("imagery_sources".to_string(), "a<b>&\"c\"".to_string());
        tags.insert("other".to_string(), "x".to_string());
        let xml = format_gdal_metadata(&tags);
        assert_eq!(parse_gdal_metadata(&xml), tags);

        let with_band = "<GDALMetadata>\n  <Item name=\"STATISTICS_MEAN\" sample=\"0\">4</Item>\n  <Item name=\"k\">v</Item>\n</GDALMetadata>";
        let parsed = parse_gdal_metadata(with_band);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_gdal_metadata_xml_variants() {
        let xml = "<GDALMetadata>\n\
            <Item role='description' name='imagery_sources'>srtm/a.tif,&#x67;mted/b.tif</Item>\n\
            <Item name=\"empty\"></Item>\n\
            <Item sample=\"0\" name=\"STATISTICS_MAXIMUM\" role=\"statistics\">8848</Item>\n\
            </GDALMetadata>\0";
        let parsed = parse_gdal_metadata(xml);
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.get("imagery_sources").map(String::as_str),
            Some("srtm/a.tif,gmted/b.tif")
        );
        assert_eq!(parsed.get("empty").map(String::as_str), Some(""));

        assert!(parse_gdal_metadata("<GDALMetadata><Item name=\"k\">").is_empty());
    }

    /// A tile laid out the way GDAL writes one: Int16 samples, tiepoint and
    /// pixel scale, a GeoKey directory with an ASCII citation, GDAL nodata and
    /// metadata.
    fn gdal_style_tile() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).unwrap();
            let mut image = encoder.new_image::<GrayI16>(3, 2).unwrap();
            let dir = image.encoder();
            dir.write_tag(Tag::ModelPixelScaleTag, &[30.0, 30.0, 0.0][..]).unwrap();
            dir.write_tag(
                Tag::ModelTiepointTag,
                &[0.0, 0.0, 0.0, 500_000.0, 4_000_000.0, 0.0][..],
            )
            .unwrap();
            let geokeys: [u16; 20] = [
                1, 1, 0, 4, //
                GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_PROJECTED, //
                GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA, //
                1026, 34737, 25, 0, //
                PROJECTED_CS_TYPE_GEO_KEY, 0, 1, 3857,
            ];
            dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..]).unwrap();
            dir.write_tag(Tag::Unknown(34737), "WGS 84 / Pseudo-Mercator|").unwrap();
            dir.write_tag(Tag::GdalNodata, "-32768").unwrap();
            dir.write_tag(
                Tag::Unknown(GDAL_METADATA),
                "<GDALMetadata>\n  <Item name='imagery_sources'>srtm/N45E006.tif</Item>\n</GDALMetadata>\n",
            )
            .unwrap();
            image.write_data(&[-32768i16, 12, 345, -20, 0, 8848][..]).unwrap();
        }
        out.into_inner()
    }

    #[test]
    fn test_read_gdal_style_tile() {
        let buffer = read_geotiff_from(Cursor::new(gdal_style_tile())).unwrap();
        let meta = buffer.meta();

        assert_eq!(meta.crs(), Crs::WEB_MERCATOR);
        assert_eq!(
            meta.transform(),
            GeoTransform::from_origin(500_000.0, 4_000_000.0, 30.0, 30.0)
        );
        assert_eq!((meta.width(), meta.height()), (3, 2));
        assert_eq!(meta.dtype(), SampleType::I16);
        assert_eq!(meta.nodata(), Some(-32768.0));
        assert_eq!(buffer.data(), &[-32768.0, 12.0, 345.0, -20.0, 0.0, 8848.0]);
        assert!(meta.is_nodata(buffer.data()[0]));
        assert_eq!(
            meta.tags().get("imagery_sources").map(String::as_str),
            Some("srtm/N45E006.tif")
        );
    }

    #[test]
    fn test_geokey_directory() {
        let keys = geokey_directory(Crs::WEB_MERCATOR);
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(&keys[12..], &[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, 3857]);
        let keys = geokey_directory(Crs::WGS84);
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
    }
}
