//! Per-operation driver metrics.

use std::time::Instant;

/// Records the outcome and latency of one driver operation.
///
/// Emits `graph_driver_operations_total` and
/// `graph_driver_operation_duration_ms`, both labelled by backend, operation,
/// and status (`success` or `error`).
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "graph_driver_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "graph_driver_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `op` and records its metrics.
pub fn timed<T>(
    backend: &'static str,
    operation: &'static str,
    op: impl FnOnce() -> crate::Result<T>,
) -> crate::Result<T> {
    let start = Instant::now();
    let result = op();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_timed_passes_through_results() {
        let ok = timed("sqlite", "get_node", || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: crate::Result<()> = timed("sqlite", "get_node", || {
            Err(Error::Validation("bad".to_string()))
        });
        assert!(err.unwrap_err().is_validation());
    }
}
