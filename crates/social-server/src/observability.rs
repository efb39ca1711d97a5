//! Logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise `[logging] level` applies to the
//! workspace crates and to `tower_http` request traces, while every other
//! dependency logs at `warn`. The level can be changed after startup through
//! a reload handle, since the config file is read after tracing starts.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Crates whose logs follow the configured level.
const FOLLOWS_LEVEL: [&str; 4] = [
    "social_server",
    "social_auth",
    "social_db_memory",
    "tower_http",
];

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter directives for `level`, e.g. `warn,social_server=debug,...`.
pub fn directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(FOLLOWS_LEVEL.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber at `info` until the config is loaded.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives("info")));
    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Switches to the configured level unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::debug!("RUST_LOG set, ignoring logging.level");
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(directives(level))) {
        tracing::warn!(error = %e, "Failed to apply logging level");
    }
}
