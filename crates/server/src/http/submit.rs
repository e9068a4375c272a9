use axum::Form;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use campus_contracts::{ApiResponse, NewReport};

use super::{AppState, first_value, instrumented};

const ROUTE: &str = "/api/report/submit";

type FormPairs = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    UrlEncoded,
    Multipart,
    Other,
}

/// Submitted fields in lookup order. A url-encoded body shadows the query
/// string; multipart values only fill keys the query string lacks.
#[derive(Debug)]
struct SubmittedFields {
    first: FormPairs,
    second: FormPairs,
}

impl SubmittedFields {
    fn new(kind: BodyKind, body: FormPairs, query: FormPairs) -> Self {
        match kind {
            BodyKind::Multipart => Self {
                first: query,
                second: body,
            },
            BodyKind::UrlEncoded | BodyKind::Other => Self {
                first: body,
                second: query,
            },
        }
    }

    fn value(&self, key: &str) -> String {
        first_value(&self.first, key)
            .or_else(|| first_value(&self.second, key))
            .unwrap_or_default()
            .to_string()
    }
}

pub(super) async fn submit_report(State(state): State<AppState>, request: Request) -> Response {
    if request.method() != Method::POST {
        crate::metrics::observe_rejected_request(
            ROUTE,
            request.method().as_str(),
            StatusCode::METHOD_NOT_ALLOWED.as_u16(),
        );
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n").into_response();
    }

    let headers = request.headers().clone();
    let query_fields = Query::<FormPairs>::try_from_uri(request.uri())
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let kind = body_kind(request.headers());
    let body_fields = match read_body_fields(kind, request).await {
        Ok(fields) => fields,
        Err(rejection) => {
            crate::metrics::observe_rejected_request(ROUTE, "POST", rejection.status().as_u16());
            return rejection;
        }
    };

    let fields = SubmittedFields::new(kind, body_fields, query_fields);
    let report = NewReport {
        category: fields.value("category"),
        title: fields.value("title"),
        description: fields.value("description"),
        location: fields.value("location"),
    };

    instrumented(ROUTE, "POST", &headers, async {
        if let Err(message) = report.validate() {
            return ApiResponse::failure(message);
        }

        match state.repository.insert_report(&report).await {
            Ok(submitted) => {
                crate::metrics::inc_reports_submitted();
                tracing::info!(
                    report_id = submitted.id,
                    token = %submitted.token,
                    category = %report.category,
                    "report submitted"
                );
                ApiResponse::ok_with_message(submitted, "Report submitted successfully")
            }
            Err(err) => {
                tracing::warn!(error = %err, "report insert failed");
                ApiResponse::failure(format!("Failed to save report: {}", err))
            }
        }
    })
    .await
    .into_response()
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        BodyKind::Multipart
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        BodyKind::UrlEncoded
    } else {
        BodyKind::Other
    }
}

/// Reads url-encoded or multipart form fields. File parts are skipped.
/// Only an oversized body is an error; any other malformed body yields the
/// fields read so far, and validation reports what is missing.
async fn read_body_fields(kind: BodyKind, request: Request) -> Result<FormPairs, Response> {
    match kind {
        BodyKind::Multipart => read_multipart_fields(request).await,
        BodyKind::UrlEncoded => match Form::<FormPairs>::from_request(request, &()).await {
            Ok(Form(fields)) => Ok(fields),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(rejection.into_response())
            }
            Err(rejection) => {
                tracing::debug!(error = %rejection, "unreadable form body");
                Ok(Vec::new())
            }
        },
        BodyKind::Other => Ok(Vec::new()),
    }
}

async fn read_multipart_fields(request: Request) -> Result<FormPairs, Response> {
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable multipart body");
            return Ok(Vec::new());
        }
    };

    let mut fields = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(err.into_response());
            }
            Err(err) => {
                tracing::debug!(error = %err, "multipart body ended early");
                break;
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            continue;
        }

        match field.text().await {
            Ok(value) => fields.push((name, value)),
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(err.into_response());
            }
            Err(err) => {
                tracing::debug!(error = %err, "multipart field unreadable");
                break;
            }
        }
    }

    Ok(fields)
}
