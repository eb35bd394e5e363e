//! The bbox-to-raster entry point.
//!
//! Flow: validate the request, resolve tiles, optionally ask for confirmation,
//! fetch (or reuse cached) tiles, merge, clip, then reproject.

use crate::bbox::BoundingBox;
use crate::clip::clip;
use crate::crs::Crs;
use crate::estimate::estimate_size_gb;
use crate::fetch::{DownloadProgress, HttpTransport, TileFetcher, TileTransport};
use crate::mosaic::merge_with_nodata;
use crate::raster::Raster;
use crate::settings::Settings;
use crate::tiles::{resolve_tiles, MAX_ZOOM, MIN_ZOOM};
use crate::{DemError, Result};
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the mosaic is cropped before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Crop to the requested bounding box.
    #[default]
    Bbox,
    /// Keep the full extent of the covering tiles.
    Tile,
}

impl fmt::Display for ClipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipMode::Bbox => f.write_str("bbox"),
            ClipMode::Tile => f.write_str("tile"),
        }
    }
}

impl FromStr for ClipMode {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bbox" => Ok(ClipMode::Bbox),
            "tile" => Ok(ClipMode::Tile),
            _ => Err(DemError::InvalidInput(format!(
                "clip must be either 'bbox' or 'tile', got {s:?}"
            ))),
        }
    }
}

/// Parameters of one elevation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationRequest {
    /// `(min_lon, min_lat, max_lon, max_lat)` in WGS84 degrees.
    pub bbox: (f64, f64, f64, f64),
    /// Tile zoom, 0 to 14.
    pub zoom: u8,
    /// Output CRS such as `"EPSG:4326"`; `None` keeps Web Mercator.
    pub crs: Option<String>,
    pub clip: ClipMode,
    /// Tile cache directory; `None` uses [`Settings::cache_dir`].
    pub cache_dir: Option<PathBuf>,
    /// Reuse tiles already in the cache.
    pub use_cache: bool,
    /// Remove the cache directory once the mosaic is built.
    pub delete_cache: bool,
    /// Log the pipeline stages at info rather than debug level.
    pub verbose: bool,
}

impl ElevationRequest {
    /// Request with the default options: Web Mercator output, clipped to
    /// the box, cache reused and deleted afterwards.
    pub fn new(bbox: (f64, f64, f64, f64), zoom: u8) -> Self {
        Self {
            bbox,
            zoom,
            crs: None,
            clip: ClipMode::Bbox,
            cache_dir: None,
            use_cache: true,
            delete_cache: true,
            verbose: true,
        }
    }
}

/// Decides whether a large download may go ahead.
pub trait ConfirmDownload {
    /// Called with the estimated download size in GB.
    fn confirm(&self, estimated_gb: f64) -> bool;
}

impl<F: Fn(f64) -> bool> ConfirmDownload for F {
    fn confirm(&self, estimated_gb: f64) -> bool {
        self(estimated_gb)
    }
}

/// Accepts every download.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmDownload for AlwaysConfirm {
    fn confirm(&self, _estimated_gb: f64) -> bool {
        true
    }
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl ConfirmDownload for StdinConfirm {
    fn confirm(&self, estimated_gb: f64) -> bool {
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        match prompt_yes_no(&mut stdin.lock(), &mut stderr, &confirmation_message(estimated_gb)) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

/// Question shown before a large download.
pub fn confirmation_message(estimated_gb: f64) -> String {
    format!("The estimated download size is {estimated_gb:.2} GB. Do you want to continue? (y/n) ")
}

/// Print `message` and read one line; only `y` or `yes` count as consent.
pub fn prompt_yes_no<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, message: &str) -> io::Result<bool> {
    write!(writer, "{message}")?;
    writer.flush()?;
    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

type SharedCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Runs elevation requests against a tile server.
pub struct ElevationClient {
    settings: Settings,
    transport: Arc<dyn TileTransport>,
    callback: Option<SharedCallback>,
}

impl fmt::Debug for ElevationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ElevationClient {
    /// Client using HTTP with the configured timeout.
    pub fn new(settings: Settings) -> Result<Self> {
        let transport = HttpTransport::with_timeout(settings.request_timeout())?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    /// Client using a custom transport.
    pub fn with_transport(settings: Settings, transport: Arc<dyn TileTransport>) -> Self {
        Self {
            settings,
            transport,
            callback: None,
        }
    }

    /// Report per-tile download progress.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build the elevation raster for `request`.
    ///
    /// Returns `Ok(None)` only when the download needed confirmation and
    /// `confirm` declined it. Request validation happens before any
    /// filesystem or network access.
    pub fn get_elevation_raster(
        &self,
        request: &ElevationRequest,
        confirm: &dyn ConfirmDownload,
    ) -> Result<Option<Raster>> {
        let bbox = BoundingBox::from_wgs84(request.bbox)?;
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&request.zoom) {
            return Err(DemError::InvalidInput(format!(
                "zoom must be an integer between {MIN_ZOOM} and {MAX_ZOOM}, got {}",
                request.zoom
            )));
        }
        let target_crs = match request.crs.as_deref() {
            Some(crs) => Crs::parse(crs)?,
            None => Crs::WEB_MERCATOR,
        };
        let cache_dir = request
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.settings.cache_dir.clone());

        fs::create_dir_all(&cache_dir)?;

        let tiles = resolve_tiles(&bbox, request.zoom);
        if self.settings.ask_confirmation {
            let size = estimate_size_gb(tiles.len());
            if size > self.settings.min_size_for_confirmation_gb && !confirm.confirm(size) {
                log_stage(request.verbose, "Operation aborted by the user");
                if request.delete_cache {
                    remove_cache(&cache_dir)?;
                }
                return Ok(None);
            }
        }

        let mut fetcher = TileFetcher::new(&cache_dir, Box::new(Arc::clone(&self.transport)))
            .with_base_url(self.settings.base_url.as_str())
            .with_use_cache(request.use_cache)
            .with_verbose(request.verbose);
        if let Some(callback) = &self.callback {
            let callback = Arc::clone(callback);
            fetcher = fetcher.with_callback(Box::new(move |progress: &DownloadProgress| callback(progress)));
        }
        let paths = fetcher.fetch_tiles(&tiles)?;

        log_stage(request.verbose, &format!("Mosaicing {} tile(s)", paths.len()));
        let mut mosaic = merge_with_nodata(&paths, self.settings.nodata)?;
        if request.clip == ClipMode::Bbox {
            mosaic = clip(&mosaic, &bbox)?;
        }

        if request.delete_cache {
            remove_cache(&cache_dir)?;
        }

        let mut raster = Raster::new(mosaic);
        if target_crs != Crs::WEB_MERCATOR {
            log_stage(request.verbose, &format!("Reprojecting to {target_crs}"));
            raster.reproject(&target_crs)?;
        }
        Ok(Some(raster))
    }
}

fn log_stage(verbose: bool, message: &str) {
    if verbose {
        info!("{message}");
    } else {
        debug!("{message}");
    }
}

fn remove_cache(cache_dir: &Path) -> Result<()> {
    if cache_dir.exists() {
        debug!("Removing cache directory {}", cache_dir.display());
        fs::remove_dir_all(cache_dir)?;
    }
    Ok(())
}

/// Build an elevation raster over HTTP, prompting on the terminal if
/// `settings` asks for confirmation.
pub fn get_elevation_raster(request: &ElevationRequest, settings: &Settings) -> Result<Option<Raster>> {
    ElevationClient::new(settings.clone())?.get_elevation_raster(request, &StdinConfirm)
}
