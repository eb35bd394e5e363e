//! One `elevatr` invocation: build the raster and write it out.

use crate::cli::Cli;
use crate::config::resolve_settings;
use crate::error::RunnerError;
use crate::progress;
use elevatr_dem::{
    AlwaysConfirm, ConfirmDownload, Crs, ElevationClient, RasterStatistics, StdinConfirm,
};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The raster was written to `path`.
    Written {
        path: PathBuf,
        width: usize,
        height: usize,
        crs: Crs,
        statistics: Option<RasterStatistics>,
    },
    /// The download was declined at the confirmation prompt.
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Written {
                path,
                width,
                height,
                crs,
                statistics,
            } => {
                write!(f, "Wrote {width}x{height} raster in {crs} to {}", path.display())?;
                match statistics {
                    Some(s) => write!(
                        f,
                        "\nElevation: min {:.1}, max {:.1}, mean {:.1} ({} valid samples)",
                        s.min, s.max, s.mean, s.valid_count
                    ),
                    None => write!(f, "\nNo valid elevation samples"),
                }
            }
            Outcome::Aborted => write!(f, "Operation aborted, nothing written"),
        }
    }
}

/// Run with the HTTP transport, the configured settings and a terminal
/// prompt (unless `--yes`).
pub fn run(cli: &Cli) -> Result<Outcome, RunnerError> {
    let settings = resolve_settings(cli)?;
    let pb = progress::bar(cli.quiet);
    let client = ElevationClient::new(settings)?.with_progress(progress::tracker(pb.clone()));

    let outcome = if cli.yes {
        execute(cli, &client, &AlwaysConfirm)
    } else {
        execute(cli, &client, &StdinConfirm)
    };
    pb.finish_and_clear();
    outcome
}

/// Run the request described by `cli` on `client`, writing the result to
/// `cli.output`.
pub fn execute(cli: &Cli, client: &ElevationClient, confirm: &dyn ConfirmDownload) -> Result<Outcome, RunnerError> {
    let request = cli.request();
    let Some(raster) = client.get_elevation_raster(&request, confirm)? else {
        return Ok(Outcome::Aborted);
    };

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    raster.to_tif(&cli.output, cli.compression.name())?;
    info!("Raster written to {}", cli.output.display());

    Ok(Outcome::Written {
        path: cli.output.clone(),
        width: raster.width(),
        height: raster.height(),
        crs: raster.crs(),
        statistics: raster.statistics(),
    })
}
