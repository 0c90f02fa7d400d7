use axum::{extract::State, Extension, Json};

use crate::auth::middleware::AuthUser;
use crate::dto::ProfileResponse;
use crate::error::AppResult;
use crate::guard::Action;
use crate::models::profile::{Profile, ProfilePatch};
use crate::AppState;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.profiles.load(auth_user.id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<Json<ProfileResponse>> {
    let _guard = state
        .in_flight
        .try_begin(auth_user.id, Action::SaveProfile)?;

    let profile = state.profiles.save(auth_user.id, patch).await?;
    Ok(Json(ProfileResponse {
        profile,
        status: "Profile saved successfully!".into(),
    }))
}
