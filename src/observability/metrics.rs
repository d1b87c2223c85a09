//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by method, status, instance
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_selection_failures_total` (counter): requests with no alive instance
//! - `balancer_instance_alive` (gauge): 1=alive, 0=dead, per instance
//! - `balancer_instance_weight` (gauge): current weight, per instance
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, instance: &str, start: Instant) {
    metrics::counter!(
        "balancer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "instance" => instance.to_string()
    )
    .increment(1);

    metrics::histogram!("balancer_request_duration_seconds", "instance" => instance.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a request rejected because no instance was selectable.
pub fn record_selection_failure() {
    metrics::counter!("balancer_selection_failures_total").increment(1);
}

pub fn record_instance_health(instance: &str, alive: bool) {
    metrics::gauge!("balancer_instance_alive", "instance" => instance.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

pub fn record_instance_weight(instance: &str, weight: u16) {
    metrics::gauge!("balancer_instance_weight", "instance" => instance.to_string())
        .set(f64::from(weight));
}
