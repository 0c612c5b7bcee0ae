//! Metrics collection and export for crier.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use crier_core::DeliveryReport;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const BROADCASTS_TOTAL: &str = "crier_broadcasts_total";
    pub const DELIVERIES_TOTAL: &str = "crier_deliveries_total";
    pub const BROADCAST_SECONDS: &str = "crier_broadcast_seconds";
    pub const BATCHES_TOTAL: &str = "crier_batches_total";
    pub const ERRORS_TOTAL: &str = "crier_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::BROADCASTS_TOTAL,
        "Total number of broadcasts published"
    );
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Total per-recipient delivery outcomes"
    );
    metrics::describe_histogram!(
        names::BROADCAST_SECONDS,
        "Wall-clock duration of broadcast fan-outs in seconds"
    );
    metrics::describe_counter!(
        names::BATCHES_TOTAL,
        "Total recipient batches delivered on behalf of sibling nodes"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record one completed broadcast fan-out.
pub fn record_broadcast(kind: &'static str, report: &DeliveryReport) {
    counter!(names::BROADCASTS_TOTAL, "kind" => kind).increment(1);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "delivered")
        .increment(report.delivered as u64);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "failed").increment(report.failed as u64);
    histogram!(names::BROADCAST_SECONDS).record(report.elapsed_ms as f64 / 1000.0);
}

/// Record one batch delivered for a sibling node.
pub fn record_batch(recipients: usize) {
    counter!(names::BATCHES_TOTAL).increment(1);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "batched").increment(recipients as u64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_does_not_panic_without_exporter() {
        let report = DeliveryReport {
            attempted: 2,
            delivered: 1,
            failed: 1,
            elapsed_ms: 12,
        };
        record_broadcast("text", &report);
        record_batch(10);
        record_error("store");
    }
}
