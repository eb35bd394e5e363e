//! Runner error type.

use elevatr_dem::DemError;
use thiserror::Error;

/// Errors that end an `elevatr` run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Dem(#[from] DemError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
