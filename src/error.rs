use std::path::PathBuf;

use crate::chart::ChartError;
use crate::config::{BenchmarkConfiguration, ConfigError};
use crate::parser::ParseError;
use crate::series::SeriesError;

/// Fatal failures. Any of these aborts the whole sweep; unstable batches are not errors.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to reset pool {path}: {source}")]
    StoreReset {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to execute benchmark {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("benchmark failed for {configuration}: {status}")]
    BenchmarkFailed {
        configuration: BenchmarkConfiguration,
        status: String,
    },

    #[error("unreadable benchmark output for {configuration}: {source}")]
    Parse {
        configuration: BenchmarkConfiguration,
        source: ParseError,
    },

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read report {path}: {source}")]
    ReadReport {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed report: {0}")]
    Report(#[from] serde_json::Error),
}
