//! Tracing setup for the server binary.
//!
//! The subscriber is installed before the configuration file is read, so its
//! filter sits behind a reload layer and is swapped once `logging.level` is
//! known. A `RUST_LOG` variable pins the filter for the whole run.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

/// Chatty dependencies held at `warn` whatever the configured level.
const QUIET_TARGETS: &[&str] = &["hyper", "h2", "redis", "deadpool"];

struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned_by_env: bool,
}

static LOG_CONTROL: OnceLock<LogControl> = OnceLock::new();

/// Filter directives for a configured level.
pub fn directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level == "off" {
        return level;
    }
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_tracing(logging: &LoggingConfig) {
    let pinned_by_env = std::env::var_os("RUST_LOG").is_some();
    let filter = if pinned_by_env {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directives(&logging.level)))
    } else {
        EnvFilter::new(directives(&logging.level))
    };

    let (filter, handle) = reload::Layer::new(filter);
    if LOG_CONTROL
        .set(LogControl {
            handle,
            pinned_by_env,
        })
        .is_err()
    {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switches the running subscriber to the configured level.
pub fn apply_logging(logging: &LoggingConfig) {
    let Some(control) = LOG_CONTROL.get() else {
        return;
    };
    if control.pinned_by_env {
        tracing::debug!("RUST_LOG is set, keeping its filter");
        return;
    }
    if let Err(e) = control
        .handle
        .reload(EnvFilter::new(directives(&logging.level)))
    {
        tracing::warn!(error = %e, level = %logging.level, "Failed to apply logging level");
    }
}
