use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::calendar::{month_grid, MonthGrid, YearMonth};
use crate::dto::CalendarQuery;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub async fn get_month(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<MonthGrid>> {
    let current = YearMonth::containing(Utc::now().date_naive());
    let ym = YearMonth::new(
        query.year.unwrap_or(current.year),
        query.month.unwrap_or(current.month),
    )
    .ok_or_else(|| AppError::Validation("Month must be between 1 and 12".into()))?;

    let logs = state.logs.list_all(auth_user.id).await?;
    let grid = month_grid(ym, &logs)
        .ok_or_else(|| AppError::Validation("Year is out of range".into()))?;

    Ok(Json(grid))
}
