//! Prometheus metrics for the guard pipeline.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    static ref REQUESTS_TOTAL: IntCounter = register_int_counter!(
        "gateway_requests_total",
        "Total requests entering the guard pipeline"
    )
    .expect("register gateway_requests_total");
    static ref POLICY_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gateway_policy_rejections_total",
        "Requests rejected by a pipeline stage",
        &["stage"]
    )
    .expect("register gateway_policy_rejections_total");
    static ref STAGE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gateway_stage_failures_total",
        "Unexpected stage failures mapped to 500 responses",
        &["stage"]
    )
    .expect("register gateway_stage_failures_total");
}

pub fn record_request() {
    REQUESTS_TOTAL.inc();
}

pub fn record_rejection(stage: &str) {
    POLICY_REJECTIONS_TOTAL.with_label_values(&[stage]).inc();
}

pub fn record_stage_failure(stage: &str) {
    STAGE_FAILURES_TOTAL.with_label_values(&[stage]).inc();
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
