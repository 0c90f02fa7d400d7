use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Extension, Json,
};
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{ChatRequest, ChatResponse, ReportRequest, ReportResponse};
use crate::error::{AppError, AppResult};
use crate::guard::Action;
use crate::AppState;

pub async fn chat(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    body.validate()?;
    let _guard = state.in_flight.try_begin(auth_user.id, Action::Chat)?;

    let reply = state
        .assistant
        .chat(auth_user.id, &body.question, body.history)
        .await?;
    Ok(Json(reply.into()))
}

/// Body is optional; an empty POST summarizes without a stated purpose.
pub async fn report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ReportResponse>> {
    let body = parse_report_request(&headers, &body)?;
    body.validate()?;
    let _guard = state.in_flight.try_begin(auth_user.id, Action::Report)?;

    let report = state
        .assistant
        .clinical_summary(auth_user.id, body.visit_purpose.as_deref())
        .await?;
    Ok(Json(report.into()))
}

/// An empty body means "no purpose". Anything else must be a well-formed
/// JSON document.
fn parse_report_request(headers: &HeaderMap, body: &[u8]) -> AppResult<ReportRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReportRequest::default());
    }
    if !has_json_content_type(headers) {
        return Err(AppError::BadRequest(
            "Expected request with `Content-Type: application/json`".into(),
        ));
    }

    let Json(request) = Json::<ReportRequest>::from_bytes(body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    Ok(request)
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}
