//! Command-line arguments.

use clap::{Parser, ValueEnum};
use elevatr_dem::{ClipMode, Compression, ElevationRequest};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClipArg {
    /// Crop to the bounding box
    Bbox,
    /// Keep whole tiles
    Tile,
}

impl From<ClipArg> for ClipMode {
    fn from(clip: ClipArg) -> Self {
        match clip {
            ClipArg::Bbox => ClipMode::Bbox,
            ClipArg::Tile => ClipMode::Tile,
        }
    }
}

/// Download an elevation raster for a bounding box from the AWS terrain tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "elevatr", version, about, long_about = None)]
pub struct Cli {
    /// Bounding box as min_lon,min_lat,max_lon,max_lat in WGS84 degrees
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: (f64, f64, f64, f64),

    /// Tile zoom level
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=14))]
    pub zoom: u8,

    /// Output CRS, e.g. EPSG:4326 (default: Web Mercator)
    #[arg(long)]
    pub crs: Option<String>,

    /// Crop to the bounding box or keep whole tiles
    #[arg(long, value_enum, default_value_t = ClipArg::Bbox)]
    pub clip: ClipArg,

    /// Tile cache directory (overrides the configuration)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Download every tile even if it is cached
    #[arg(long)]
    pub no_cache: bool,

    /// Keep the tile cache after the run
    #[arg(long)]
    pub keep_cache: bool,

    /// Output GeoTIFF path
    #[arg(short, long, default_value = "elevation.tif")]
    pub output: PathBuf,

    /// GeoTIFF compression: none, lzw, packbits, deflate, zstd or lzma
    #[arg(long, default_value = "lzw", value_parser = parse_compression)]
    pub compression: Compression,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not ask before large downloads
    #[arg(short, long)]
    pub yes: bool,

    /// Only log warnings and errors, and hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// The pipeline request described by these arguments.
    ///
    /// The cache directory is left unset when `--cache-dir` is absent so
    /// the configured one applies.
    pub fn request(&self) -> ElevationRequest {
        let mut request = ElevationRequest::new(self.bbox, self.zoom);
        request.crs = self.crs.clone();
        request.clip = self.clip.into();
        request.cache_dir = self.cache_dir.clone();
        request.use_cache = !self.no_cache;
        request.delete_cache = !self.keep_cache;
        request.verbose = !self.quiet;
        request
    }
}

fn parse_bbox(s: &str) -> Result<(f64, f64, f64, f64), String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("invalid number {v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        &[min_lon, min_lat, max_lon, max_lat] => Ok((min_lon, min_lat, max_lon, max_lat)),
        _ => Err(format!(
            "expected 4 comma-separated values (min_lon,min_lat,max_lon,max_lat), got {}",
            values.len()
        )),
    }
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    s.parse::<Compression>().map_err(|e| e.to_string())
}
