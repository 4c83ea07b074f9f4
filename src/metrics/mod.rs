//! Prometheus metrics for the pantry service, exposed in text format at `/metrics`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
}

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
}

pub static SALES_RECORDED: Lazy<IntCounter> =
    Lazy::new(|| register_counter("pantry_sales_recorded_total", "Sales recorded"));

pub static UNITS_DISTRIBUTED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "pantry_units_distributed_total",
        "Units handed out through sales and bulk orders",
    )
});

pub static SALES_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "pantry_sales_rejected_total",
        "Sales refused, by error kind",
        &["reason"],
    )
});

pub static EDIT_CHANGES_APPLIED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "pantry_edit_changes_applied_total",
        "Manual inventory edits written to the audit log",
    )
});

pub static FORECAST_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "pantry_forecast_runs_total",
        "Forecast invocations, by outcome",
        &["outcome"],
    )
});

pub static EVENTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "pantry_events_processed_total",
        "Domain events consumed by the event loop",
        &["event"],
    )
});

/// Touches every metric so that they are exported before their first increment.
pub fn init_metrics() {
    Lazy::force(&SALES_RECORDED);
    Lazy::force(&UNITS_DISTRIBUTED);
    Lazy::force(&SALES_REJECTED);
    Lazy::force(&EDIT_CHANGES_APPLIED);
    Lazy::force(&FORECAST_RUNS);
    Lazy::force(&EVENTS_PROCESSED);
}

pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
