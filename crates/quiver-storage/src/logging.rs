//! Structured logging for quiver.
//!
//! Centralized logging configuration using the `tracing` crate,
//! configured via the `QUIVER_LOG` environment variable.
//!
//! # Environment Variables
//!
//! - `QUIVER_LOG=info` - Default log level (info)
//! - `QUIVER_LOG=debug` - Verbose logging
//! - `QUIVER_LOG=quiver_storage::importer=debug` - Module-specific logging
//! - `QUIVER_LOG=warn,quiver_storage::block_cache=debug` - Combined filters

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber with default settings.
///
/// Uses the `QUIVER_LOG` environment variable for configuration.
/// Default level is `info` if not specified.
///
/// This function should be called once at application startup.
/// Subsequent calls are ignored (tracing only allows one subscriber).
pub fn init() {
    init_with_default("info");
}

/// Initializes the global tracing subscriber with a custom default level.
pub fn init_with_default(default_level: &str) {
    let filter =
        EnvFilter::try_from_env("QUIVER_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let _ = subscriber.try_init();
}
