//! Document store seam.
//!
//! The repositories and the identity handlers only talk to these traits.
//! [`postgres::PgStore`] is the production backend; [`memory::MemoryStore`]
//! backs local runs without `DATABASE_URL` and the test suite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::log_entry::{LogChange, LogChanges, LogEntry, LogQuery, NewLogEntry};
use crate::models::profile::{Profile, ProfilePatch};
use crate::models::user::{Account, NewRefreshToken, RefreshToken};

pub mod memory;
pub mod postgres;

/// Capacity of the log change feed. Slow subscribers that fall further behind
/// than this get a resnapshot instead of the missed events.
pub const CHANGE_FEED_CAPACITY: usize = 256;

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert_log(&self, entry: NewLogEntry) -> StoreResult<LogEntry>;

    /// Merges `changes` into the entry `id` owned by `user_id`.
    /// `StoreError::NotFound` when no such entry exists for that user.
    async fn update_log(&self, user_id: Uuid, id: Uuid, changes: LogChanges)
        -> StoreResult<LogEntry>;

    /// `StoreError::NotFound` when no such entry exists for that user.
    async fn delete_log(&self, user_id: Uuid, id: Uuid) -> StoreResult<()>;

    async fn query_logs(&self, query: &LogQuery) -> StoreResult<Vec<LogEntry>>;

    fn subscribe_changes(&self) -> broadcast::Receiver<LogChange>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>>;

    /// Set-with-merge: creates the document if missing.
    async fn merge_profile(
        &self,
        user_id: Uuid,
        patch: ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Profile>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates the account and its profile document (email only).
    /// `StoreError::Conflict` if the email is taken.
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Account>;

    async fn create_anonymous_account(&self) -> StoreResult<Account>;

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<Uuid>;

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;

    async fn revoke_refresh_token(&self, id: Uuid) -> StoreResult<()>;

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<()>;

    /// Deletes refresh tokens that expired before `now`, revoked or not.
    /// Returns how many were removed.
    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait DocumentStore: LogStore + ProfileStore + IdentityStore {
    /// Cheap round trip used by `/readyz`.
    async fn ping(&self) -> StoreResult<()>;
}

/// Periodically drops expired refresh tokens so the token table stays bounded.
pub fn spawn_refresh_token_purge(store: Arc<dyn DocumentStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired_refresh_tokens(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired refresh tokens"),
                Err(e) => tracing::warn!(error = %e, "Refresh token purge failed"),
            }
        }
    });
}
