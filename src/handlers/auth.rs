use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    jwt::{create_token_pair, hash_token, verify_token, TokenType},
    middleware::AuthUser,
    password::{hash_password, verify_password},
};
use crate::dto::{AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest};
use crate::error::{AppError, AppResult};
use crate::models::user::{Account, AccountSummary, NewRefreshToken};
use crate::store::StoreError;
use crate::AppState;

/// Mints a token pair and persists the refresh token's hash.
async fn issue_tokens(
    state: &AppState,
    account: &Account,
    parent_token_id: Option<Uuid>,
) -> AppResult<AuthResponse> {
    let tokens = create_token_pair(account, &state.config)?;

    state
        .store
        .insert_refresh_token(NewRefreshToken {
            user_id: account.id,
            token_hash: hash_token(&tokens.refresh_token),
            expires_at: Utc::now() + Duration::seconds(state.config.jwt_refresh_ttl_secs),
            parent_token_id,
        })
        .await?;

    Ok(AuthResponse {
        user_id: account.id,
        is_anonymous: account.is_anonymous,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    body.validate()?;
    let email = body.email.trim().to_lowercase();

    let pwd_hash = hash_password(&body.password)?;
    let account = state
        .store
        .create_account(&email, &pwd_hash)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict(
                "This email is already in use. Please use a different email or log in.".into(),
            ),
            other => other.into(),
        })?;

    tracing::info!(user_id = %account.id, "Account registered");
    let tokens = issue_tokens(&state, &account, None).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// Anonymous sign-in. The account has no email and no password.
pub async fn guest(State(state): State<AppState>) -> AppResult<Json<AuthResponse>> {
    let account = state.store.create_anonymous_account().await?;

    tracing::info!(user_id = %account.id, "Anonymous account created");
    Ok(Json(issue_tokens(&state, &account, None).await?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = body.email.trim().to_lowercase();
    let account = state
        .store
        .find_account_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let password_hash = account
        .password_hash
        .as_deref()
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(&body.password, password_hash)? {
        tracing::debug!(user_id = %account.id, "Password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    Ok(Json(issue_tokens(&state, &account, None).await?))
}

/// Single-use refresh rotation. Presenting an already-revoked token revokes
/// every token of that user.
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let claims = verify_token(&body.refresh_token, &state.config)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized);
    }

    let stored = state
        .store
        .find_refresh_token(&hash_token(&body.refresh_token))
        .await?
        .ok_or(AppError::Unauthorized)?;

    if stored.revoked {
        tracing::warn!(
            user_id = %stored.user_id,
            token_id = %stored.id,
            "Refresh token reuse detected, revoking all tokens for user"
        );
        state.store.revoke_all_refresh_tokens(stored.user_id).await?;
        return Err(AppError::Unauthorized);
    }

    if stored.user_id != claims.sub || stored.expires_at < Utc::now() {
        return Err(AppError::Unauthorized);
    }

    state.store.revoke_refresh_token(stored.id).await?;

    let account = state
        .store
        .find_account(claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(issue_tokens(&state, &account, Some(stored.id)).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<MessageResponse>> {
    state.store.revoke_all_refresh_tokens(auth_user.id).await?;

    tracing::info!(user_id = %auth_user.id, "Signed out");
    Ok(Json(MessageResponse {
        message: "Logged out successfully".into(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<AccountSummary>> {
    let account = state
        .store
        .find_account(auth_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(account.into()))
}
