//! Logging setup
//!
//! JSON lines on stdout, optionally mirrored to a file. `RUST_LOG` wins over
//! the `--verbose` default when set.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the file writer alive; dropping it flushes and closes the log file
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let stdout_layer = fmt::layer().json().with_writer(io::stdout);

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
