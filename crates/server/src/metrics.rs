use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static REPORTS_SUBMITTED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("campus_http_requests_total", "API request count."),
                &["route", "method", "status"],
            )
            .expect("create campus_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "campus_http_request_duration_seconds",
                    "API request duration in seconds.",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create campus_http_request_duration_seconds"),
        )
    })
}

fn reports_submitted_total() -> &'static IntCounter {
    REPORTS_SUBMITTED_TOTAL.get_or_init(|| {
        register_collector(
            IntCounter::new(
                "campus_reports_submitted_total",
                "Reports stored through the submit endpoint.",
            )
            .expect("create campus_reports_submitted_total"),
        )
    })
}

/// `success` is the envelope flag; every envelope is sent with HTTP 200.
pub fn observe_api_request(route: &str, method: &str, success: bool, duration: Duration) {
    http_requests_total()
        .with_label_values(&[route, method, "200"])
        .inc();

    let outcome = if success { "success" } else { "error" };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_rejected_request(route: &str, method: &str, status: u16) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();
}

pub fn inc_reports_submitted() {
    reports_submitted_total().inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
