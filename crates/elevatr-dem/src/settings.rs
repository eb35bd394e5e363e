//! Pipeline configuration.

use crate::fetch::DEFAULT_TIMEOUT_SECS;
use crate::raster::DEFAULT_NODATA;
use crate::tiles::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for [`crate::get_elevation_raster`].
///
/// Every field has a default, so a configuration file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ask before downloading more than `min_size_for_confirmation_gb`.
    pub ask_confirmation: bool,
    /// Estimated download size (GB) above which confirmation is required.
    pub min_size_for_confirmation_gb: f64,
    /// Default tile cache directory.
    pub cache_dir: PathBuf,
    /// Tile server base URL; tiles are `{base_url}/{z}/{x}/{y}.tif`.
    pub base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Nodata written where no tile has data.
    pub nodata: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ask_confirmation: true,
            min_size_for_confirmation_gb: 1.0,
            cache_dir: PathBuf::from("./cache"),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            nodata: DEFAULT_NODATA,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
