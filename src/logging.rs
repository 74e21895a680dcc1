//! Diagnostics setup. Everything goes to stderr so stdout stays reserved for reports.

use std::env;
use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives used when neither an explicit level nor the environment sets one.
pub const DEFAULT_FILTER: &str = "info";
pub const FILTER_ENV: &str = "PMEMKV_BREAKDOWN_LOG";
pub const FORMAT_ENV: &str = "PMEMKV_BREAKDOWN_LOG_FORMAT";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("invalid PMEMKV_BREAKDOWN_LOG_FORMAT {0:?} (expected 'json' or 'pretty')")]
    Format(String),

    #[error("failed to initialize logging: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, LoggingError> {
        if value.eq_ignore_ascii_case("json") {
            Ok(LogFormat::Json)
        } else if value.eq_ignore_ascii_case("pretty") {
            Ok(LogFormat::Pretty)
        } else {
            Err(LoggingError::Format(value.to_string()))
        }
    }
}

/// Filter directives in effect: `level`, else `PMEMKV_BREAKDOWN_LOG`, else `info`.
pub fn filter_directives(level: Option<&str>) -> String {
    level
        .map(str::to_string)
        .or_else(|| env::var(FILTER_ENV).ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Returns `false` when one is already installed.
pub fn init(level: Option<&str>) -> Result<bool, LoggingError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let directives = filter_directives(level);
    let filter = EnvFilter::try_new(&directives).map_err(|source| LoggingError::Filter {
        filter: directives.clone(),
        source,
    })?;
    let format = match env::var(FORMAT_ENV) {
        Ok(value) => LogFormat::parse(&value)?,
        Err(_) => LogFormat::Pretty,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .json();
            registry.with(layer).try_init()?;
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false);
            registry.with(layer).try_init()?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins() {
        assert_eq!(filter_directives(Some("pmemkv_breakdown=debug")), "pmemkv_breakdown=debug");
    }

    #[test]
    fn formats_are_case_insensitive() {
        assert_eq!(LogFormat::parse("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty").unwrap(), LogFormat::Pretty);
        assert!(matches!(LogFormat::parse("xml"), Err(LoggingError::Format(_))));
    }

    #[test]
    fn bad_filter_is_reported() {
        let err = init(Some("pmemkv_breakdown=loud")).unwrap_err();
        assert!(matches!(err, LoggingError::Filter { .. }));
    }
}
