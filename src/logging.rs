//! Tracing setup: human-readable stderr output plus an append-only log file.
//!
//! `RUST_LOG` overrides the default `info` filter for both outputs.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log file path.
pub const LOG_PATH: &str = "app.log";

/// RFC 3339 local timestamps, e.g. `2024-05-01T12:00:00+02:00`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc3339Local;

impl FormatTime for Rfc3339Local {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
        )
    }
}

/// Install the global subscriber. Fails if the log file cannot be opened.
pub fn initialize(log_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_timer(Rfc3339Local)
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_timer(Rfc3339Local)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
