use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use campus_contracts::{
    ApiResponse, FILTERED_REPORTS_LIMIT, LATEST_REPORTS_LIMIT, LatestReport, Report,
    ReportFilter, Stats,
};
use campus_store::StoreError;

use super::{AppState, first_value, instrumented};

type QueryPairs = Query<Vec<(String, String)>>;

pub(super) async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ApiResponse<Stats>> {
    instrumented("/api/stats", "GET", &headers, async {
        match state.repository.get_stats().await {
            Ok(stats) => ApiResponse::ok(stats),
            Err(err) => {
                tracing::warn!(error = %err, "stats read failed");
                ApiResponse::failure(format!("Database error: {}", err))
            }
        }
    })
    .await
}

pub(super) async fn latest_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ApiResponse<Vec<LatestReport>>> {
    instrumented("/api/reports/latest", "GET", &headers, async {
        match state.repository.list_latest(LATEST_REPORTS_LIMIT).await {
            Ok(reports) => {
                ApiResponse::ok(reports.into_iter().map(LatestReport::from).collect())
            }
            Err(err) => {
                tracing::warn!(error = %err, "latest reports query failed");
                ApiResponse::failure("Failed to fetch reports")
            }
        }
    })
    .await
}

pub(super) async fn filtered_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): QueryPairs,
) -> Json<ApiResponse<Vec<Report>>> {
    let filter = ReportFilter {
        category: first_value(&params, "category").map(str::to_string),
        status: first_value(&params, "status").map(str::to_string),
        search: first_value(&params, "search").map(str::to_string),
    };

    instrumented("/api/reports", "GET", &headers, async {
        // Tokens are returned unmasked here, unlike the latest listing.
        match state
            .repository
            .list_filtered(&filter, FILTERED_REPORTS_LIMIT)
            .await
        {
            Ok(reports) => ApiResponse::ok(reports),
            Err(err) => {
                tracing::warn!(error = %err, "filtered reports query failed");
                ApiResponse::failure("Failed to fetch reports")
            }
        }
    })
    .await
}

pub(super) async fn track_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): QueryPairs,
) -> Json<ApiResponse<Report>> {
    let token = first_value(&params, "token").unwrap_or_default().to_string();

    instrumented("/api/report/track", "GET", &headers, async {
        if token.is_empty() {
            return ApiResponse::failure("Token is required");
        }

        match state.repository.find_by_token(&token).await {
            Ok(report) => ApiResponse::ok(report),
            Err(StoreError::NotFound) => ApiResponse::failure("Report not found"),
            Err(err) => {
                tracing::warn!(error = %err, "track lookup failed");
                ApiResponse::failure("Database error")
            }
        }
    })
    .await
}
