//! Gateway observability metrics
//!
//! Thin wrappers over the `metrics` facade. Nothing is recorded unless the
//! binary installs a recorder (Prometheus exporter).

use crate::backend::health::EndpointState;
use std::time::Duration;

/// Record the outcome of one call against a search index endpoint
pub fn record_backend_attempt(endpoint: &str, outcome: &str, duration: Duration) {
    metrics::counter!(
        "threadvault_backend_attempts_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "threadvault_backend_call_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Publish an endpoint's state (0 healthy, 1 degraded, 2 unavailable)
pub fn update_endpoint_state(endpoint: &str, state: EndpointState) {
    let value = match state {
        EndpointState::Healthy => 0.0,
        EndpointState::Degraded => 1.0,
        EndpointState::Unavailable => 2.0,
    };
    metrics::gauge!(
        "threadvault_endpoint_state",
        "endpoint" => endpoint.to_string(),
    )
    .set(value);
}

/// Record a delegation to the relational store
pub fn record_relational_fallback(template: &str, status: &str) {
    metrics::counter!(
        "threadvault_relational_fallback_total",
        "template" => template.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record end-to-end handling time of one gateway operation
pub fn record_request(operation: &str, status: &str, duration: Duration) {
    metrics::histogram!(
        "threadvault_request_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record an analyzer section that did not complete
pub fn record_failed_section(section: &str) {
    metrics::counter!(
        "threadvault_analyzer_failed_sections_total",
        "section" => section.to_string(),
    )
    .increment(1);
}
