//! Observability: structured logging and metrics.

mod logging;
mod metrics;

pub use logging::{LOG_FILTER_ENV, LogFormat, LoggingConfig};
pub use metrics::{install_prometheus_recorder, render as render_metrics};

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if logging was already initialized by this function or
/// another subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(config.env_filter())
            .try_init()
            .map_err(init_error)?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(config.env_filter())
            .try_init()
            .map_err(init_error)?,
    }

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })
}

fn init_error(err: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: err.to_string(),
    }
}
