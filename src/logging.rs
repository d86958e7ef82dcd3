//! Log subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else --log-level)
//!   └── Fmt Layer (JSON to stdout)
//! ```

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the level filter
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `info`,
/// `form_uploadr=debug`) is used.
pub fn env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| LoggingError::InvalidFilter(format!("{}: {}", default_level, e))),
    }
}

/// Install the global JSON subscriber
pub fn init_subscriber(default_level: &str) -> Result<(), LoggingError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_current_span(true);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(default_level)?)
        .with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
