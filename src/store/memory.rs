use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{
    DocumentStore, IdentityStore, LogStore, ProfileStore, StoreError, StoreResult,
    CHANGE_FEED_CAPACITY,
};
use crate::models::log_entry::{
    ChangeKind, LogChange, LogChanges, LogEntry, LogQuery, NewLogEntry, SortOrder,
};
use crate::models::profile::{Profile, ProfilePatch};
use crate::models::user::{Account, NewRefreshToken, RefreshToken};

/// In-process store (single-instance deployments and tests).
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<LogChange>,
}

#[derive(Default)]
struct Collections {
    logs: HashMap<Uuid, LogEntry>,
    profiles: HashMap<Uuid, Profile>,
    accounts: HashMap<Uuid, Account>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
            changes,
        }
    }

    /// Number of live change-feed receivers.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn publish(&self, user_id: Uuid, log_id: Uuid, kind: ChangeKind) {
        // No receivers is fine: nobody is listening.
        let _ = self.changes.send(LogChange {
            user_id,
            log_id,
            kind,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_log(&self, entry: NewLogEntry) -> StoreResult<LogEntry> {
        let log = LogEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            log_date: entry.log_date,
            title: entry.title,
            description: entry.description,
            severity: entry.severity,
            image_url: entry.image_url,
            created_at: entry.created_at,
            updated_at: entry.created_at,
        };
        self.inner.write().await.logs.insert(log.id, log.clone());
        self.publish(log.user_id, log.id, ChangeKind::Insert);
        Ok(log)
    }

    async fn update_log(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: LogChanges,
    ) -> StoreResult<LogEntry> {
        let updated = {
            let mut inner = self.inner.write().await;
            let log = inner
                .logs
                .get_mut(&id)
                .filter(|log| log.user_id == user_id)
                .ok_or(StoreError::NotFound)?;

            if let Some(log_date) = changes.log_date {
                log.log_date = log_date;
            }
            if let Some(title) = changes.title {
                log.title = title;
            }
            if let Some(description) = changes.description {
                log.description = description;
            }
            if let Some(severity) = changes.severity {
                log.severity = severity;
            }
            if let Some(image_url) = changes.image_url {
                log.image_url = Some(image_url);
            }
            log.updated_at = changes.updated_at;
            log.clone()
        };
        self.publish(user_id, id, ChangeKind::Update);
        Ok(updated)
    }

    async fn delete_log(&self, user_id: Uuid, id: Uuid) -> StoreResult<()> {
        {
            let mut inner = self.inner.write().await;
            let owned = inner
                .logs
                .get(&id)
                .is_some_and(|log| log.user_id == user_id);
            if !owned {
                return Err(StoreError::NotFound);
            }
            inner.logs.remove(&id);
        }
        self.publish(user_id, id, ChangeKind::Delete);
        Ok(())
    }

    async fn query_logs(&self, query: &LogQuery) -> StoreResult<Vec<LogEntry>> {
        let inner = self.inner.read().await;
        let mut logs: Vec<LogEntry> = inner
            .logs
            .values()
            .filter(|log| query.matches(log))
            .cloned()
            .collect();

        logs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if query.order == SortOrder::Descending {
            logs.reverse();
        }
        if let Some(limit) = query.limit {
            logs.truncate(limit.max(0) as usize);
        }
        Ok(logs)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<LogChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn merge_profile(
        &self,
        user_id: Uuid,
        patch: ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Profile> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .profiles
            .entry(user_id)
            .or_insert_with(|| Profile::empty(user_id));
        patch.apply(profile);
        profile.updated_at = Some(updated_at);
        Ok(profile.clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Account> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .accounts
            .values()
            .any(|a| a.email.as_deref() == Some(email));
        if taken {
            return Err(StoreError::Conflict("Email already registered".into()));
        }

        let account = Account {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            password_hash: Some(password_hash.to_string()),
            is_anonymous: false,
            created_at: Utc::now(),
        };
        inner.accounts.insert(account.id, account.clone());
        inner.profiles.insert(
            account.id,
            Profile {
                email: Some(email.to_string()),
                ..Profile::empty(account.id)
            },
        );
        Ok(account)
    }

    async fn create_anonymous_account(&self) -> StoreResult<Account> {
        let account = Account {
            id: Uuid::new_v4(),
            email: None,
            password_hash: None,
            is_anonymous: true,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .inner
            .read()
            .await
            .accounts
            .values()
            .find(|a| !a.is_anonymous && a.email.as_deref() == Some(email))
            .cloned())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> StoreResult<Uuid> {
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked: false,
            parent_token_id: token.parent_token_id,
            created_at: Utc::now(),
        };
        let id = record.id;
        self.inner.write().await.refresh_tokens.insert(id, record);
        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self
            .inner
            .read()
            .await
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> StoreResult<()> {
        if let Some(token) = self.inner.write().await.refresh_tokens.get_mut(&id) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for token in inner.refresh_tokens.values_mut() {
            if token.user_id == user_id {
                token.revoked = true;
            }
        }
        Ok(())
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
