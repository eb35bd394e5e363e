//! Command-line runner for `elevatr-dem`.
//!
//! Parses arguments, loads settings, sets up logging and the download
//! progress bar, then runs one elevation request and writes the GeoTIFF.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod run;

pub use cli::{ClipArg, Cli};
pub use config::{apply_overrides, load_settings, parse_settings, resolve_settings};
pub use error::RunnerError;
pub use run::{execute, run, Outcome};
