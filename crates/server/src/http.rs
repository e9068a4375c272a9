use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use campus_contracts::ApiResponse;
use campus_store::{ReportRepository, ReportStore};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{ServerConfig, StartupError};

mod reports;
mod submit;

pub const MAX_FORM_BYTES: usize = 10 << 20;

#[derive(Clone)]
pub struct AppState {
    repository: Arc<dyn ReportRepository>,
}

impl AppState {
    pub fn new(repository: Arc<dyn ReportRepository>) -> Self {
        Self { repository }
    }
}

pub async fn connect_store(config: &ServerConfig) -> Result<ReportStore, StartupError> {
    let schema = config.load_schema()?;

    ReportStore::connect_and_prepare(&config.db_url, config.store_options(), &schema)
        .await
        .map_err(|err| StartupError {
            code: "ERR_STORE_UNAVAILABLE",
            message: format!("failed to initialize report store: {}", err),
        })
}

pub fn prepare_upload_dir(config: &ServerConfig) -> Result<(), StartupError> {
    std::fs::create_dir_all(&config.upload_dir).map_err(|err| StartupError {
        code: "ERR_UPLOAD_DIR",
        message: format!(
            "failed to create upload directory {}: {}",
            config.upload_dir, err
        ),
    })
}

pub fn router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/stats", get(reports::stats))
        .route("/api/reports/latest", get(reports::latest_reports))
        .route("/api/reports", get(reports::filtered_reports))
        .route(
            "/api/report/submit",
            any(submit::submit_report).layer(DefaultBodyLimit::max(MAX_FORM_BYTES)),
        )
        .route("/api/report/track", get(reports::track_report))
        .fallback_service(ServeDir::new(static_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_count: Option<i64>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let store_ready = state.repository.ping().await.is_ok();
    checks.insert("store", store_ready);

    let report_count = if store_ready {
        state.repository.count_reports().await.ok()
    } else {
        None
    };

    let status = if store_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if store_ready { "ready" } else { "not_ready" },
            checks,
            report_count,
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Runs one API handler inside a request span and records its outcome.
async fn instrumented<T, F>(
    route: &'static str,
    method: &'static str,
    headers: &HeaderMap,
    handler: F,
) -> Json<ApiResponse<T>>
where
    F: Future<Output = ApiResponse<T>>,
{
    let started = Instant::now();
    let request_id = extract_request_id(headers);
    let span = tracing::info_span!(
        "api.request",
        route = route,
        method = method,
        request_id = %request_id,
        success = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = handler.instrument(span.clone()).await;

    let elapsed = started.elapsed();
    span.record("success", response.success);
    span.record("latency_ms", elapsed.as_millis() as u64);
    crate::metrics::observe_api_request(route, method, response.success, elapsed);

    Json(response)
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

// Repeated keys resolve to their first occurrence.
fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_sanitized_and_bounded() {
        assert_eq!(
            sanitize_request_id("req 01/<script>"),
            Some("req01script".to_string())
        );
        assert_eq!(sanitize_request_id("!!!"), None);
        assert_eq!(
            sanitize_request_id(&"a".repeat(100)).map(|s| s.len()),
            Some(64)
        );
    }

    #[test]
    fn missing_request_id_falls_back_to_ulid() {
        let id = extract_request_id(&HeaderMap::new());
        assert!(id.parse::<Ulid>().is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req_42"));
        assert_eq!(extract_request_id(&headers), "req_42");
    }

    #[test]
    fn first_value_prefers_earliest_pair() {
        let pairs = vec![
            ("status".to_string(), "pending".to_string()),
            ("status".to_string(), "resolved".to_string()),
            ("search".to_string(), String::new()),
        ];
        assert_eq!(first_value(&pairs, "status"), Some("pending"));
        assert_eq!(first_value(&pairs, "search"), Some(""));
        assert_eq!(first_value(&pairs, "category"), None);
    }
}
