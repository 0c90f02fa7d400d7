use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    DocumentStore, IdentityStore, LogStore, ProfileStore, StoreError, StoreResult,
    CHANGE_FEED_CAPACITY,
};
use crate::models::log_entry::{LogChange, LogChanges, LogEntry, LogQuery, NewLogEntry, SortOrder};
use crate::models::profile::{Profile, ProfilePatch};
use crate::models::user::{Account, NewRefreshToken, RefreshToken};

/// Channel the `logs_notify_change` trigger publishes on.
const LOG_CHANGES_CHANNEL: &str = "log_changes";

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<LogChange>,
}

impl PgStore {
    /// Wraps the pool and starts forwarding `LISTEN log_changes` notifications
    /// into the in-process change feed.
    pub async fn connect(pool: PgPool) -> Result<Self, sqlx::Error> {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(LOG_CHANGES_CHANNEL).await?;
        spawn_change_forwarder(listener, changes.clone());

        Ok(Self { pool, changes })
    }
}

fn spawn_change_forwarder(mut listener: PgListener, tx: broadcast::Sender<LogChange>) {
    tokio::spawn(async move {
        loop {
            match listener.try_recv().await {
                Ok(Some(notification)) => {
                    match serde_json::from_str::<LogChange>(notification.payload()) {
                        Ok(change) => {
                            let _ = tx.send(change);
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                payload = notification.payload(),
                                "Ignoring malformed log change notification"
                            );
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!("Log change listener lost its connection, reconnecting");
                    reconnect(&mut listener).await;
                    // Notifications sent while disconnected are gone.
                    let _ = tx.send(LogChange::resync());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Log change listener error");
                    tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                }
            }
        }
    });
}

/// Any statement on the listener re-opens its connection and re-issues LISTEN.
async fn reconnect(listener: &mut PgListener) {
    while let Err(e) = sqlx::query("SELECT 1").execute(&mut *listener).await {
        tracing::error!(error = %e, "Log change listener reconnect failed");
        tokio::time::sleep(LISTENER_RETRY_DELAY).await;
    }
    tracing::info!("Log change listener reconnected");
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl LogStore for PgStore {
    async fn insert_log(&self, entry: NewLogEntry) -> StoreResult<LogEntry> {
        let log = sqlx::query_as::<_, LogEntry>(
            r#"
            INSERT INTO logs (id, user_id, log_date, title, description, severity, image_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.log_date)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(entry.severity)
        .bind(&entry.image_url)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn update_log(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: LogChanges,
    ) -> StoreResult<LogEntry> {
        sqlx::query_as::<_, LogEntry>(
            r#"
            UPDATE logs SET
                log_date = COALESCE($3, log_date),
                title = COALESCE($4, title),
                description = COALESCE($5, description),
                severity = COALESCE($6, severity),
                image_url = COALESCE($7, image_url),
                updated_at = $8
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(changes.log_date)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.severity)
        .bind(&changes.image_url)
        .bind(changes.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_log(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM logs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn query_logs(&self, query: &LogQuery) -> StoreResult<Vec<LogEntry>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM logs WHERE user_id = ");
        qb.push_bind(query.user_id);

        if let Some(since) = query.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }

        qb.push(match query.order {
            SortOrder::Ascending => " ORDER BY created_at ASC, id ASC",
            SortOrder::Descending => " ORDER BY created_at DESC, id DESC",
        });

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit.max(0));
        }

        let logs = qb.build_query_as::<LogEntry>().fetch_all(&self.pool).await?;
        Ok(logs)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<LogChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT user_id, email, personal_history, family_history, updated_at FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn merge_profile(
        &self,
        user_id: Uuid,
        patch: ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO users (user_id, personal_history, family_history, updated_at)
            VALUES ($1, COALESCE($2, ''), COALESCE($3, ''), $4)
            ON CONFLICT (user_id) DO UPDATE SET
                personal_history = COALESCE($2, users.personal_history),
                family_history = COALESCE($3, users.family_history),
                updated_at = $4
            RETURNING user_id, email, personal_history, family_history, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&patch.personal_history)
        .bind(&patch.family_history)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, password_hash, is_anonymous)
            VALUES ($1, $2, $3, false)
            RETURNING id, email, password_hash, is_anonymous, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("Email already registered".into())
            } else {
                StoreError::Database(e)
            }
        })?;

        sqlx::query("INSERT INTO users (user_id, email) VALUES ($1, $2)")
            .bind(account.id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn create_anonymous_account(&self) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, is_anonymous)
            VALUES ($1, true)
            RETURNING id, email, password_hash, is_anonymous, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, is_anonymous, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, is_anonymous, created_at
            FROM accounts
            WHERE email = $1 AND is_anonymous = false
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, parent_token_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.parent_token_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, revoked, parent_token_id, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = NOW()
            WHERE user_id = $1 AND revoked = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
