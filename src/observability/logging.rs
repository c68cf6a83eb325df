//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Map the configured level onto a tracing filter
//! - Write to the console or to a per-instance log file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` overrides the configured level
//! - Initialization never fails: an unusable log file falls back to stdout

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global logger.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(config: &LoggingConfig, instance_id: Option<u32>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.log_level)));

    let file = if config.log_file.is_empty() {
        None
    } else {
        let path = instance_log_path(Path::new(&config.log_file), instance_id);
        Some(open_log_file(&path).map_err(|e| (path, e)))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let (installed, fallback) = match file {
        Some(Ok(file)) => (
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init(),
            None,
        ),
        Some(Err(failure)) => (registry.with(tracing_subscriber::fmt::layer()).try_init(), Some(failure)),
        None => (registry.with(tracing_subscriber::fmt::layer()).try_init(), None),
    };

    if installed.is_err() {
        tracing::debug!("Logger already installed, keeping existing subscriber");
    }
    if let Some((path, error)) = fallback {
        tracing::warn!(
            path = %path.display(),
            detail = %error,
            "Unable to open log file, logging to console"
        );
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Insert the instance id before the extension: `trickster.log` → `trickster.2.log`.
pub fn instance_log_path(path: &Path, instance_id: Option<u32>) -> PathBuf {
    let Some(id) = instance_id.filter(|id| *id > 0) else {
        return path.to_path_buf();
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{id}"),
    };
    path.with_file_name(name)
}

/// Translate a configured level (any case) into a filter directive.
pub fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
