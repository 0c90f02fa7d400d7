use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

use super::Clock;
use crate::error::{AppError, AppResult};
use crate::models::log_entry::{
    LogChanges, LogDraft, LogEntry, LogQuery, NewLogEntry, SortOrder, DEFAULT_SEVERITY,
};
use crate::store::{LogStore, StoreError, StoreResult};

/// Snapshots buffered per subscriber before the refresh task waits.
const SUBSCRIPTION_BUFFER: usize = 8;

pub type Snapshot = StoreResult<Vec<LogEntry>>;

#[derive(Clone)]
pub struct LogRepository {
    store: Arc<dyn LogStore>,
    clock: Clock,
}

impl LogRepository {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self::with_clock(store, Utc::now)
    }

    pub fn with_clock(store: Arc<dyn LogStore>, clock: Clock) -> Self {
        Self { store, clock }
    }

    /// Live journal for `user_id`, newest first.
    ///
    /// The first item is the current snapshot; each change to this user's
    /// entries, and each feed resync, pushes a fresh one. A failed refresh is delivered as an `Err`
    /// item and the subscription keeps running. Call
    /// [`LogSubscription::cancel`] when the consumer goes away.
    pub fn list(&self, user_id: Uuid) -> LogSubscription {
        let store = self.store.clone();
        // Subscribe before the first snapshot so no change falls in between.
        let mut changes = store.subscribe_changes();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let task = tokio::spawn(async move {
            let query = LogQuery::journal(user_id);
            if !push_snapshot(store.as_ref(), &query, &tx).await {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(change) if !change.concerns(user_id) => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(user_id = %user_id, skipped, "Log feed lagged, resnapshotting");
                    }
                    Err(RecvError::Closed) => break,
                }

                // Fold a burst of queued changes into one refresh.
                loop {
                    match changes.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                if !push_snapshot(store.as_ref(), &query, &tx).await {
                    break;
                }
            }
        });

        tracing::debug!(user_id = %user_id, "Log subscription started");
        LogSubscription {
            user_id,
            snapshots: rx,
            task,
        }
    }

    /// One-shot journal snapshot, newest first.
    pub async fn list_all(&self, user_id: Uuid) -> AppResult<Vec<LogEntry>> {
        Ok(self.store.query_logs(&LogQuery::journal(user_id)).await?)
    }

    /// The `limit` most recent entries, newest first.
    pub async fn list_recent(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LogEntry>> {
        let query = LogQuery {
            limit: Some(limit),
            ..LogQuery::journal(user_id)
        };
        Ok(self.store.query_logs(&query).await?)
    }

    /// Entries created at or after `since`, oldest first.
    pub async fn list_window(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<LogEntry>> {
        let query = LogQuery {
            user_id,
            order: SortOrder::Ascending,
            since: Some(since),
            limit: None,
        };
        Ok(self.store.query_logs(&query).await?)
    }

    /// Creates the entry when `draft.id` is absent, otherwise merges the draft
    /// into the existing entry. `created_at` is only ever written on create.
    pub async fn save(&self, user_id: Uuid, draft: LogDraft) -> AppResult<LogEntry> {
        validate_draft(&draft)?;
        let now = (self.clock)();

        let entry = match draft.id {
            None => {
                self.store
                    .insert_log(NewLogEntry {
                        user_id,
                        log_date: draft.log_date.unwrap_or_else(|| now.date_naive()),
                        title: draft.title,
                        description: draft.description,
                        severity: draft.severity.unwrap_or(DEFAULT_SEVERITY),
                        image_url: draft.image_url,
                        created_at: now,
                    })
                    .await?
            }
            Some(id) => self
                .store
                .update_log(
                    user_id,
                    id,
                    LogChanges {
                        log_date: draft.log_date,
                        title: Some(draft.title),
                        description: Some(draft.description),
                        severity: draft.severity,
                        image_url: draft.image_url,
                        updated_at: now,
                    },
                )
                .await
                .map_err(not_found_as("Log not found"))?,
        };

        tracing::info!(user_id = %user_id, log_id = %entry.id, "Log saved");
        Ok(entry)
    }

    /// Permanent delete. A second delete of the same id is `NotFound`.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> AppResult<()> {
        self.store
            .delete_log(user_id, id)
            .await
            .map_err(not_found_as("Log not found"))?;

        tracing::info!(user_id = %user_id, log_id = %id, "Log deleted");
        Ok(())
    }
}

fn validate_draft(draft: &LogDraft) -> AppResult<()> {
    draft.validate()?;
    if draft.title.trim().is_empty() || draft.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Please fill in a title and description.".into(),
        ));
    }
    Ok(())
}

fn not_found_as(message: &'static str) -> impl Fn(StoreError) -> AppError {
    move |err| match err {
        StoreError::NotFound => AppError::NotFound(message.into()),
        other => other.into(),
    }
}

async fn push_snapshot(
    store: &dyn LogStore,
    query: &LogQuery,
    tx: &mpsc::Sender<Snapshot>,
) -> bool {
    let snapshot = store.query_logs(query).await;
    if let Err(e) = &snapshot {
        tracing::warn!(user_id = %query.user_id, error = %e, "Could not refresh logs");
    }
    tx.send(snapshot).await.is_ok()
}

/// Handle to a live journal query. Dropping it also stops the refresh task.
pub struct LogSubscription {
    user_id: Uuid,
    snapshots: mpsc::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl LogSubscription {
    /// Waits for the next snapshot. `None` once the feed has shut down.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    /// Stops listening. Consumes the handle, so it can only happen once.
    pub fn cancel(self) {
        tracing::debug!(user_id = %self.user_id, "Log subscription cancelled");
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
