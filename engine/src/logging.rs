//! Logging setup
//!
//! Events go to stdout and, when a log file is configured, are appended to
//! it one line per event. Every line starts with the unix timestamp.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::Result;

/// Timestamps lines with whole seconds since the unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixTimestamp;

impl FormatTime for UnixTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().timestamp())
    }
}

/// Parse a level name, falling back to `info`
pub fn parse_level(log_level: &str) -> tracing::Level {
    match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    }
}

/// Default event log name for a staking token
pub fn default_log_file(staking_symbol: &str) -> String {
    format!("log_{}.txt", staking_symbol)
}

/// Initialize logging
pub fn init_logging(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    let level = parse_level(log_level);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_timer(UnixTimestamp)
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("restaker={},restaker_chain={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_timer(UnixTimestamp))
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::RestakerError::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
