//! Prometheus metrics for webhook deliveries and the dispatch pool.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Helper functions to record delivery and task outcomes

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

use crate::AppState;

// Metric names as constants for consistency
pub const WEBHOOK_DELIVERIES_TOTAL: &str = "webhook_deliveries_total";
pub const DISPATCH_TASKS_TOTAL: &str = "dispatch_tasks_total";
pub const DISPATCH_WORKERS: &str = "dispatch_workers";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!(
        WEBHOOK_DELIVERIES_TOTAL,
        "Webhook deliveries by result (accepted/ignored/rejected/error)"
    );
    describe_counter!(
        DISPATCH_TASKS_TOTAL,
        "Dispatched tasks by outcome (completed/failed/caller_runs)"
    );
    describe_gauge!(DISPATCH_WORKERS, "Number of live dispatch workers");
}

/// GET /metrics - Returns Prometheus-formatted metrics.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

pub fn record_webhook(result: &'static str) {
    counter!(WEBHOOK_DELIVERIES_TOTAL, "result" => result).increment(1);
}

pub fn record_task_completed() {
    counter!(DISPATCH_TASKS_TOTAL, "outcome" => "completed").increment(1);
}

pub fn record_task_failed() {
    counter!(DISPATCH_TASKS_TOTAL, "outcome" => "failed").increment(1);
}

/// A task that ran on the submitter because the pool was saturated.
pub fn record_caller_run() {
    counter!(DISPATCH_TASKS_TOTAL, "outcome" => "caller_runs").increment(1);
}

pub fn record_workers(count: usize) {
    gauge!(DISPATCH_WORKERS).set(count as f64);
}
