//! Settings loading.
//!
//! Settings come from an optional YAML file; any key it omits keeps its
//! default. Command-line flags are applied on top.

use crate::cli::Cli;
use crate::error::RunnerError;
use elevatr_dem::Settings;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse settings from YAML text. Blank text yields the defaults.
pub fn parse_settings(yaml: &str) -> Result<Settings, RunnerError> {
    if yaml.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| RunnerError::Config(e.to_string()))
}

/// Read settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, RunnerError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    debug!("Loading configuration from {}", path.display());
    let text = fs::read_to_string(path)
        .map_err(|e| RunnerError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_settings(&text).map_err(|e| match e {
        RunnerError::Config(msg) => RunnerError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Apply command-line overrides to loaded settings.
pub fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(cache_dir) = &cli.cache_dir {
        settings.cache_dir = cache_dir.clone();
    }
    if cli.yes {
        settings.ask_confirmation = false;
    }
    settings
}

/// Settings for this invocation: configuration file plus overrides.
pub fn resolve_settings(cli: &Cli) -> Result<Settings, RunnerError> {
    let settings = load_settings(cli.config.as_deref())?;
    Ok(apply_overrides(settings, cli))
}
