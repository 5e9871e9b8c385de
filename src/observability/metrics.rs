//! Prometheus metrics.
//!
//! Library code records through the `metrics` facade; installing a recorder is
//! left to the host process.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder and returns a render handle.
///
/// Calling this more than once returns the handle installed first.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "install_prometheus_recorder".to_string(),
            cause: e.to_string(),
        })?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Renders the current metrics in Prometheus text format, if a recorder is installed.
#[must_use]
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}
