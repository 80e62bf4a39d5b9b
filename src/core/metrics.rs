//! Prometheus metrics for monitoring the gateway.
//!
//! This module provides a centralized metrics registry for request
//! traffic, upstream attempts, breaker state and token usage.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Upstream attempts by outcome (success, retryable, terminal)
    pub upstream_attempts: IntCounterVec,

    /// Retries scheduled by the retry executor
    pub upstream_retries: IntCounter,

    /// Breaker state (0=closed, 1=open, 2=half-open)
    pub circuit_state: IntGauge,

    /// Transitions into the open state
    pub circuit_trips: IntCounter,

    /// Token usage (reported or estimated) by model and token type
    pub token_usage: IntCounterVec,

    /// Streams abandoned by the client before completion
    pub client_disconnects: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call repeatedly; the first call registers the collectors with
/// the default Prometheus registry and later calls return the same
/// instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "gateway_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "gateway_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "gateway_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let upstream_attempts = register_int_counter_vec!(
            "gateway_upstream_attempts_total",
            "Upstream attempts by outcome",
            &["outcome"]
        )
        .expect("Failed to register upstream_attempts metric");

        let upstream_retries = register_int_counter!(
            "gateway_upstream_retries_total",
            "Retries scheduled after transient upstream failures"
        )
        .expect("Failed to register upstream_retries metric");

        let circuit_state = register_int_gauge!(
            "gateway_circuit_state",
            "Circuit breaker state (0=closed, 1=open, 2=half-open)"
        )
        .expect("Failed to register circuit_state metric");

        let circuit_trips = register_int_counter!(
            "gateway_circuit_trips_total",
            "Number of times the circuit breaker opened"
        )
        .expect("Failed to register circuit_trips metric");

        let token_usage = register_int_counter_vec!(
            "gateway_tokens_total",
            "Total number of tokens used",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        let client_disconnects = register_int_counter!(
            "gateway_client_disconnects_total",
            "Streams abandoned by the client before completion"
        )
        .expect("Failed to register client_disconnects metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            upstream_attempts,
            upstream_retries,
            circuit_state,
            circuit_trips,
            token_usage,
            client_disconnects,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
