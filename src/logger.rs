use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logger already installed: {0}")]
    Init(String),
}

/// Map the bridge's numeric log level onto a tracing level name.
/// 0..=2 error, 3 warn, 4 info, 5 debug, 6 and above trace.
pub fn level_name(level: u32) -> &'static str {
    match level {
        0..=2 => "error",
        3 => "warn",
        4 => "info",
        5 => "debug",
        _ => "trace",
    }
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
pub fn build_filter(level: u32, override_filter: Option<&str>) -> Result<EnvFilter, LoggerError> {
    if let Some(filter) = override_filter {
        return EnvFilter::try_new(filter).map_err(|source| LoggerError::Filter {
            filter: filter.to_string(),
            source,
        });
    }
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_name(level))))
}

/// Install the global subscriber. Log lines go to stdout, or are appended
/// to `log_file` when one is configured.
pub fn init(level: u32, override_filter: Option<&str>, log_file: Option<&Path>) -> Result<(), LoggerError> {
    let filter = build_filter(level, override_filter)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|source| LoggerError::File {
                    path: path.to_path_buf(),
                    source,
                })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.try_init(),
    };
    installed.map_err(|e| LoggerError::Init(e.to_string()))
}
