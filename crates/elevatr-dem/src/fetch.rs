//! Tile download with a local file cache.
//!
//! Tiles live in a flat cache directory under `{source}_{z}_{x}_{y}.tif`, so
//! whether a tile is cached is a pure function of its coordinate. Downloads
//! are written to a hidden `.part` sibling and renamed into place, so an
//! interrupted download never leaves a truncated tile behind.

use crate::geotiff::{self, Compression};
use crate::raster::RasterBuffer;
use crate::tiles::{source_name, TileCoord, TileSet, DEFAULT_BASE_URL};
use crate::{DemError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Response header carrying the list of source datasets for a tile.
pub const IMAGERY_SOURCES_HEADER: &str = "x-amz-meta-x-imagery-sources";

/// Raster tag under which [`IMAGERY_SOURCES_HEADER`] is stored.
pub const IMAGERY_SOURCES_TAG: &str = "imagery_sources";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A successful tile response.
#[derive(Debug, Clone, Default)]
pub struct TileResponse {
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Value of [`IMAGERY_SOURCES_HEADER`], if present.
    pub imagery_sources: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP GET abstraction, so the fetcher can run against a fake server.
pub trait TileTransport: Send + Sync {
    /// GET `url`.
    ///
    /// Transport failures and non-success statuses are reported as `Err`
    /// with a human-readable reason.
    fn get(&self, url: &str) -> std::result::Result<TileResponse, String>;
}

impl<T: TileTransport + ?Sized> TileTransport for Arc<T> {
    fn get(&self, url: &str) -> std::result::Result<TileResponse, String> {
        (**self).get(url)
    }
}

impl<T: TileTransport + ?Sized> TileTransport for Box<T> {
    fn get(&self, url: &str) -> std::result::Result<TileResponse, String> {
        (**self).get(url)
    }
}

/// [`TileTransport`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Client with the default 60 s timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("elevatr-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DemError::Io(std::io::Error::other(format!("failed to create HTTP client: {e}"))))?;
        Ok(Self { client })
    }
}

impl TileTransport for HttpTransport {
    fn get(&self, url: &str) -> std::result::Result<TileResponse, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE.as_str());
        let imagery_sources = header(IMAGERY_SOURCES_HEADER);

        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(TileResponse {
            content_type,
            imagery_sources,
            body,
        })
    }
}

/// Progress report for one tile.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    /// Tiles finished so far, including this one.
    pub completed: usize,
    /// Tiles in the request.
    pub total: usize,
    /// The tile just finished.
    pub coord: TileCoord,
    /// Whether it came from the cache.
    pub cached: bool,
}

/// Callback for tile download progress.
pub type DownloadCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Download statistics for the fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Number of tiles downloaded this session.
    pub tiles_downloaded: usize,
    /// Total bytes downloaded this session.
    pub bytes_downloaded: u64,
    /// Number of tiles served from the cache.
    pub cache_hits: usize,
}

/// Terrain tile fetcher with a local file cache.
pub struct TileFetcher {
    cache_dir: PathBuf,
    base_url: String,
    use_cache: bool,
    verbose: bool,
    transport: Box<dyn TileTransport>,
    callback: Option<DownloadCallback>,
    stats: DownloadStats,
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("cache_dir", &self.cache_dir)
            .field("base_url", &self.base_url)
            .field("use_cache", &self.use_cache)
            .field("stats", &self.stats)
            .finish()
    }
}

impl TileFetcher {
    /// Fetcher against the default tile server with the cache enabled.
    pub fn new<P: AsRef<Path>>(cache_dir: P, transport: Box<dyn TileTransport>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            base_url: DEFAULT_BASE_URL.to_string(),
            use_cache: true,
            verbose: true,
            transport,
            callback: None,
            stats: DownloadStats::default(),
        }
    }

    /// Use a different tile server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether existing cache files may be reused.
    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Whether the fetch summary is logged at info (default) or debug level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Report per-tile progress.
    pub fn with_callback(mut self, callback: DownloadCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get download statistics for this session.
    pub fn download_stats(&self) -> DownloadStats {
        self.stats
    }

    /// Reset download statistics.
    pub fn reset_download_stats(&mut self) {
        self.stats = DownloadStats::default();
    }

    /// Cache file for a tile from this fetcher's server.
    pub fn cache_path(&self, coord: &TileCoord) -> PathBuf {
        coord.cache_path(&self.cache_dir, source_name(&self.base_url))
    }

    /// Check if a tile is cached locally.
    pub fn is_cached(&self, coord: &TileCoord) -> bool {
        self.cache_path(coord).is_file()
    }

    /// Fetch every tile in `tiles`, in order.
    ///
    /// Returns one local path per tile. A tile is fetched at most once per
    /// call. The first failure aborts the whole request.
    pub fn fetch_tiles(&mut self, tiles: &TileSet) -> Result<Vec<PathBuf>> {
        let total = tiles.len();
        let mut resolved: HashMap<TileCoord, PathBuf> = HashMap::with_capacity(total);
        let mut paths = Vec::with_capacity(total);

        if self.verbose {
            info!("Fetching {} tile(s) at zoom {}", total, tiles.zoom());
        } else {
            debug!("Fetching {} tile(s) at zoom {}", total, tiles.zoom());
        }
        for (i, coord) in tiles.iter().enumerate() {
            let (path, cached) = match resolved.get(coord) {
                Some(path) => (path.clone(), true),
                None => {
                    let (path, cached) = self.fetch_tile_inner(coord)?;
                    resolved.insert(*coord, path.clone());
                    (path, cached)
                }
            };

            if let Some(callback) = &self.callback {
                callback(&DownloadProgress {
                    completed: i + 1,
                    total,
                    coord: *coord,
                    cached,
                });
            }
            paths.push(path);
        }

        debug!(
            "Fetch finished: {} downloaded ({} bytes), {} from cache",
            self.stats.tiles_downloaded, self.stats.bytes_downloaded, self.stats.cache_hits
        );
        Ok(paths)
    }

    /// Fetch a single tile, using the cache if allowed.
    pub fn fetch_tile(&mut self, coord: &TileCoord) -> Result<PathBuf> {
        self.fetch_tile_inner(coord).map(|(path, _)| path)
    }

    fn fetch_tile_inner(&mut self, coord: &TileCoord) -> Result<(PathBuf, bool)> {
        let cache_path = self.cache_path(coord);

        if self.use_cache && cache_path.is_file() {
            debug!("Tile {} found in cache at {}", coord, cache_path.display());
            self.stats.cache_hits += 1;
            return Ok((cache_path, true));
        }

        let url = coord.url(&self.base_url);
        debug!("Downloading tile {} from {}", coord, url);

        let response = self
            .transport
            .get(&url)
            .map_err(|reason| DemError::DownloadFailed {
                url: url.clone(),
                reason,
            })?;

        let content_type = response.content_type.clone().unwrap_or_default();
        if !content_type.to_ascii_lowercase().contains("image/tif") {
            return Err(DemError::InvalidTileFormat { url, content_type });
        }

        self.stats.tiles_downloaded += 1;
        self.stats.bytes_downloaded += response.body.len() as u64;

        let bytes = match response.imagery_sources.as_deref() {
            Some(sources) if !sources.trim().is_empty() => tag_imagery_sources(&response.body, sources)?,
            _ => response.body,
        };

        persist_atomically(&cache_path, &bytes)?;
        Ok((cache_path, false))
    }
}

/// Re-encode a tile with its imagery sources stored as a raster tag.
fn tag_imagery_sources(body: &[u8], sources: &str) -> Result<Vec<u8>> {
    let buffer = geotiff::read_geotiff_from(Cursor::new(body))?;
    let (data, meta) = buffer.into_parts();
    let tagged = RasterBuffer::new(data, meta.with_tag(IMAGERY_SOURCES_TAG, sources.trim()))?;

    let mut out = Cursor::new(Vec::with_capacity(body.len()));
    geotiff::write_geotiff_to(&tagged, &mut out, Compression::Deflate)?;
    Ok(out.into_inner())
}

/// Removes the wrapped file on drop unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut part = PartialFile {
        path: path.with_file_name(format!(".{file_name}.part")),
        armed: true,
    };

    fs::write(&part.path, bytes)?;
    fs::rename(&part.path, path)?;
    part.armed = false;
    Ok(())
}
