// src/logging.rs

//! Logging setup for `servant` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SERVANT_LOG` environment variable (any `EnvFilter` directive, e.g.
//!    "info" or "servant::supervisor=debug")
//! 3. default to `info`
//!
//! Logs go to STDERR unless `[server].log` names a file, in which case they
//! are appended there without ANSI colours.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, log_file: Option<&Path>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_directive(lvl)),
        None => EnvFilter::try_from_env("SERVANT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let mut open_error = None;
    let (writer, ansi) = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
            Err(e) => {
                open_error = Some(e);
                (BoxMakeWriter::new(std::io::stderr), true)
            }
        },
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(ansi)
        .with_writer(writer)
        .init();

    if let (Some(path), Some(e)) = (log_file, open_error) {
        warn!(path = %path.display(), error = %e, "can not open log file; logging to stderr");
    }

    Ok(())
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
