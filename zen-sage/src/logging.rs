//! Logging setup for training sessions.
//!
//! Events go to stdout and are appended to a plain-text log file, one line per
//! event with timestamp, level and message. The filter is read from the
//! `ZEN_SAGE_LOG` environment variable and defaults to `info`.
//!
//! # Example
//!
//! ```ignore
//! zen_sage::logging::init("supervised.log")?;
//! tracing::info!("Training started!");
//! ```

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::GNNResult;

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "ZEN_SAGE_LOG";

/// Default log file, relative to the working directory
pub const DEFAULT_LOG_FILE: &str = "supervised.log";

/// Install the global subscriber with the default `info` level.
///
/// Only the first call installs anything; later calls still open (and create)
/// the log file but leave the active subscriber untouched.
pub fn init(log_file: impl AsRef<Path>) -> GNNResult<()> {
    init_with_default(log_file, "info")
}

/// Install the global subscriber with a custom default level
pub fn init_with_default(log_file: impl AsRef<Path>, default_level: &str) -> GNNResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file.as_ref())?;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);

    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}
