//! Error types for the elevation pipeline.

use thiserror::Error;

/// Errors that can occur while building an elevation raster.
#[derive(Debug, Error)]
pub enum DemError {
    /// Malformed caller input (bbox, zoom, clip mode, compression...).
    ///
    /// Always raised before any I/O is attempted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// CRS identifier that is not in the projection database.
    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    /// Transport-level failure fetching a tile.
    #[error("Failed to download {url}: {reason}")]
    DownloadFailed {
        /// Tile URL.
        url: String,
        /// Underlying cause (timeout, connection error, HTTP status).
        reason: String,
    },

    /// Remote server answered with something that is not a TIFF.
    #[error("Invalid file type for URL {url} (content type {content_type:?})")]
    InvalidTileFormat {
        /// Tile URL.
        url: String,
        /// Declared content type, empty if the header was missing.
        content_type: String,
    },

    /// The merge stage was handed an empty tile list.
    #[error("No tiles to merge")]
    NoTilesToMerge,

    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or inconsistent georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported sample layout in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Sample count does not match the declared raster shape.
    #[error("Raster has {actual} samples but metadata declares {width}x{height}x{count}")]
    RasterShape {
        /// Number of samples supplied.
        actual: usize,
        /// Declared width.
        width: usize,
        /// Declared height.
        height: usize,
        /// Declared band count.
        count: usize,
    },
}
