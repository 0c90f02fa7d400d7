use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::user::Account;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
    /// Present on refresh tokens so two tokens minted in the same second differ.
    #[serde(default)]
    pub jti: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

fn sign(account: &Account, token_type: TokenType, config: &Config) -> AppResult<String> {
    let now = Utc::now();
    let (ttl, jti) = match token_type {
        TokenType::Access => (config.jwt_access_ttl_secs, None),
        TokenType::Refresh => (config.jwt_refresh_ttl_secs, Some(Uuid::new_v4())),
    };

    let claims = Claims {
        sub: account.id,
        email: account.email.clone(),
        is_anonymous: account.is_anonymous,
        exp: (now + Duration::seconds(ttl)).timestamp(),
        iat: now.timestamp(),
        token_type,
        jti,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign {:?} token: {}", token_type, e)))
}

pub fn create_token_pair(account: &Account, config: &Config) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: sign(account, TokenType::Access, config)?,
        refresh_token: sign(account, TokenType::Refresh, config)?,
        expires_in: config.jwt_access_ttl_secs,
    })
}

/// SHA-256 of a raw token, lowercase hex. Only hashes are persisted.
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_token(token: &str, config: &Config) -> AppResult<Claims> {
    let validation = Validation::default();

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Verifies `token` and requires it to be an access token.
pub fn verify_access_token(token: &str, config: &Config) -> AppResult<Claims> {
    let claims = verify_token(token, config)?;
    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}
