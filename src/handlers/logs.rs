use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{DeleteResponse, LogListResponse, SaveLogResponse};
use crate::error::AppResult;
use crate::guard::Action;
use crate::models::log_entry::{LogDraft, LogWindowQuery, RecentLogsQuery};
use crate::AppState;

const DEFAULT_RECENT_LIMIT: i64 = 20;
const MAX_RECENT_LIMIT: i64 = 100;
const DEFAULT_WINDOW_DAYS: i64 = 90;
const MAX_WINDOW_DAYS: i64 = 365;

/// Whole journal, newest first.
pub async fn list_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<LogListResponse>> {
    let logs = state.logs.list_all(auth_user.id).await?;
    Ok(Json(logs.into()))
}

pub async fn list_recent(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<RecentLogsQuery>,
) -> AppResult<Json<LogListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);

    let logs = state.logs.list_recent(auth_user.id, limit).await?;
    Ok(Json(logs.into()))
}

/// Entries created in the last `days` days, oldest first.
pub async fn list_window(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<LogWindowQuery>,
) -> AppResult<Json<LogListResponse>> {
    let days = query
        .days
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .clamp(1, MAX_WINDOW_DAYS);
    let since = Utc::now() - Duration::days(days);

    let logs = state.logs.list_window(auth_user.id, since).await?;
    Ok(Json(logs.into()))
}

/// Creates an entry, or edits one when the body carries an `id`.
pub async fn save_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(draft): Json<LogDraft>,
) -> AppResult<Json<SaveLogResponse>> {
    let _guard = state.in_flight.try_begin(auth_user.id, Action::SaveLog)?;

    let is_edit = draft.id.is_some();
    let log = state.logs.save(auth_user.id, draft).await?;

    let status = if is_edit {
        "Log updated successfully!"
    } else {
        "Log saved successfully!"
    };
    Ok(Json(SaveLogResponse {
        log,
        status: status.into(),
    }))
}

pub async fn delete_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(log_id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let _guard = state.in_flight.try_begin(auth_user.id, Action::DeleteLog)?;

    state.logs.delete(auth_user.id, log_id).await?;
    Ok(Json(DeleteResponse {
        deleted: true,
        id: log_id,
        status: "Log deleted successfully!".into(),
    }))
}
