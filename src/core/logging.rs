//! Logging setup for the command line host
//!
//! Everything is reported through `tracing`. A non-blocking worker writes the
//! events to stderr or to a time-rotated log file; stdout carries command
//! output only.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::core::config::LoggingConfig;

/// Keeps the log worker alive; dropping it flushes pending events
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Install the global subscriber described by `config`
    ///
    /// `RUST_LOG` takes precedence over the configured level.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let (writer, guard) = open_writer(config)?;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

        let layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .boxed(),
            "text" => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            other => bail!("Invalid format configuration: {}", other),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::debug!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "logging initialized"
        );
        Ok(Self { _guard: guard })
    }
}

fn open_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    match config.output.as_str() {
        "stderr" => Ok(tracing_appender::non_blocking(std::io::stderr())),
        "file" => {
            let path = config
                .log_file
                .as_deref()
                .context("log_file must be specified when output is 'file'")?;
            let appender = file_appender(path, &config.rotation, config.max_files)?;
            Ok(tracing_appender::non_blocking(appender))
        }
        other => bail!("Invalid output configuration: {}", other),
    }
}

fn rotation_of(name: &str) -> Result<Rotation> {
    match name {
        "never" => Ok(Rotation::NEVER),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        other => bail!("Invalid rotation: {}", other),
    }
}

/// Appender for `log_file`; rotated files get a date suffix
fn file_appender(log_file: &Path, rotation: &str, max_files: usize) -> Result<RollingFileAppender> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = log_file
        .file_name()
        .and_then(|name| name.to_str())
        .context("log_file must name a file")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(rotation_of(rotation)?)
        .filename_prefix(prefix)
        .max_log_files(max_files)
        .build(dir)
        .context("Failed to open log file")
}
