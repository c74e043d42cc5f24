//! Logging setup
//!
//! Human-readable output on stderr, plus an optional plain-text log file that
//! generic error messages refer users to. `PGADVISE_LOG` overrides the
//! configured filter.

use pgadvise_common::config::LoggingConfig;
use pgadvise_common::{AdvisorError, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "PGADVISE_LOG";

/// Filter from `PGADVISE_LOG`, or from the configured level.
pub fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let file_layer = match &config.file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AdvisorError::Config(format!("cannot install logger: {}", e)))
}
