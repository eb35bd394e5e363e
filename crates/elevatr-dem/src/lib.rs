//! # elevatr-dem
//!
//! Elevation rasters for arbitrary bounding boxes, assembled from the AWS
//! Open Data terrain tiles.
//!
//! ## Overview
//!
//! AWS provides global 512x512 GeoTIFF tiles in Web Mercator at zoom levels
//! 0 to 14, following the OpenStreetMap Slippy Map tiling convention:
//! `https://s3.amazonaws.com/elevation-tiles-prod/geotiff/{z}/{x}/{y}.tif`.
//!
//! A request goes through these stages:
//!
//! 1. [`resolve_tiles`] turns the WGS84 box and zoom into the covering tiles.
//! 2. [`TileFetcher`] downloads each tile into a local cache, reusing cached
//!    files when allowed.
//! 3. [`merge`] composites the tiles into one Web Mercator raster.
//! 4. [`clip`] crops the mosaic to the box (optional).
//! 5. [`reproject`] converts the result to the requested CRS (optional).
//!
//! [`get_elevation_raster`] and [`ElevationClient`] run the whole chain and
//! return a [`Raster`].
//!
//! ## Example
//!
//! ```no_run
//! use elevatr_dem::{ElevationClient, ElevationRequest, Settings, AlwaysConfirm};
//!
//! let client = ElevationClient::new(Settings::default())?;
//!
//! let mut request = ElevationRequest::new((6.8, 45.8, 6.9, 45.9), 12);
//! request.crs = Some("EPSG:4326".to_string());
//!
//! if let Some(raster) = client.get_elevation_raster(&request, &AlwaysConfirm)? {
//!     println!("{}x{} raster in {}", raster.width(), raster.height(), raster.crs());
//!     raster.to_tif("mont_blanc.tif", "lzw")?;
//! }
//! # Ok::<(), elevatr_dem::DemError>(())
//! ```

mod bbox;
mod clip;
mod crs;
mod error;
mod estimate;
mod fetch;
mod geotiff;
mod mosaic;
mod pipeline;
mod raster;
mod reproject;
mod settings;
mod tiles;
mod transform;

pub use bbox::BoundingBox;
pub use clip::{clip, read_window, window_for_bounds, Window};
pub use crs::{
    lon_lat_to_mercator, mercator_to_lon_lat, transform_bbox, Crs, CrsTransformer,
    WEB_MERCATOR_HALF_EXTENT, WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_RADIUS,
};
pub use error::DemError;
pub use estimate::{estimate_bbox_size_gb, estimate_size_gb, BYTES_PER_TILE};
pub use fetch::{
    DownloadCallback, DownloadProgress, DownloadStats, HttpTransport, TileFetcher, TileResponse,
    TileTransport, DEFAULT_TIMEOUT_SECS, IMAGERY_SOURCES_HEADER, IMAGERY_SOURCES_TAG,
};
pub use geotiff::{read_geotiff, read_geotiff_from, write_geotiff, write_geotiff_to, Compression};
pub use mosaic::{merge, merge_buffers, merge_buffers_with_nodata, merge_with_nodata};
pub use pipeline::{
    confirmation_message, get_elevation_raster, prompt_yes_no, AlwaysConfirm, ClipMode,
    ConfirmDownload, ElevationClient, ElevationRequest, StdinConfirm,
};
pub use raster::{
    Raster, RasterBuffer, RasterMeta, RasterStatistics, SampleType, DEFAULT_NODATA,
};
pub use reproject::{default_grid, reproject, TargetGrid};
pub use settings::Settings;
pub use tiles::{
    lonlat_to_tile, resolve_tiles, source_name, TileCoord, TileSet, DEFAULT_BASE_URL, MAX_ZOOM,
    MIN_ZOOM, TILE_SIZE_PX,
};
pub use transform::GeoTransform;

/// Result type for elevation operations.
pub type Result<T> = std::result::Result<T, DemError>;
