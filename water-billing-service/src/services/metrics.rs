//! Metrics module for water-billing-service.
//! Provides Prometheus metrics for billing cycles and the gRPC surface.
//!
//! HTTP request metrics are recorded by the shared middleware through the
//! `metrics` facade; [`init_metrics`] installs the recorder that backs them
//! and [`get_metrics`] renders both sources together.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec,
    TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "water_billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Billing cycles by outcome
pub static CYCLES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Billed amount by customer type (monetary tracking)
pub static BILLED_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Cycles whose difference usage was forced to the minimum
pub static RULE_OF_THREE_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// gRPC request counter
pub static GRPC_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// gRPC request duration histogram
pub static GRPC_REQUEST_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Recorder behind the `metrics` facade (HTTP middleware).
static FACADE_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn install_facade_recorder() -> PrometheusHandle {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("A metrics recorder was already installed, HTTP metrics are not exported");
    }
    handle
}

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    CYCLES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "water_billing_cycles_total",
                "Total billing cycles by status"
            ),
            &["status"]
        )
        .expect("Failed to register CYCLES_TOTAL")
    });

    BILLED_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "water_billing_billed_amount_total",
                "Total current-period amount billed by customer type"
            ),
            &["customer_type"]
        )
        .expect("Failed to register BILLED_AMOUNT_TOTAL")
    });

    RULE_OF_THREE_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "water_billing_rule_of_three_total",
            "Billing cycles where the difference usage was corrected"
        ))
        .expect("Failed to register RULE_OF_THREE_TOTAL")
    });

    GRPC_REQUESTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("water_billing_grpc_requests_total", "Total gRPC requests"),
            &["method", "status"]
        )
        .expect("Failed to register GRPC_REQUESTS_TOTAL")
    });

    GRPC_REQUEST_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "water_billing_grpc_request_duration_seconds",
                "gRPC request duration",
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
            ),
            &["method"]
        )
        .expect("Failed to register GRPC_REQUEST_DURATION")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "water_billing_errors_total",
                "Total errors by type for alerting"
            ),
            &["error_type", "method"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    FACADE_HANDLE.get_or_init(install_facade_recorder);

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    let mut output = String::from_utf8(buffer).unwrap_or_default();

    if let Some(handle) = FACADE_HANDLE.get() {
        handle.run_upkeep();
        output.push_str(&handle.render());
    }
    output
}

/// Record a billing cycle outcome.
pub fn record_cycle(status: &str) {
    if let Some(counter) = CYCLES_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Record an amount billed for the current period.
pub fn record_billed_amount(customer_type: &str, amount: f64) {
    if let Some(counter) = BILLED_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[customer_type])
            .inc_by(amount.abs());
    }
}

/// Record a rule-of-three correction.
pub fn record_rule_of_three() {
    if let Some(counter) = RULE_OF_THREE_TOTAL.get() {
        counter.inc();
    }
}

/// Record a gRPC request.
pub fn record_grpc_request(method: &str, status: &str) {
    if let Some(counter) = GRPC_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, status]).inc();
    }
}

/// Record gRPC request duration.
pub fn record_grpc_request_duration(method: &str, duration_secs: f64) {
    if let Some(histogram) = GRPC_REQUEST_DURATION.get() {
        histogram
            .with_label_values(&[method])
            .observe(duration_secs);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, method: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, method]).inc();
    }
}
