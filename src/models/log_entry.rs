use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_SEVERITY: i32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct LogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub title: String,
    pub description: String,
    pub severity: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn has_photo(&self) -> bool {
        self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Body of a save action. `id` present means "edit this entry".
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LogDraft {
    pub id: Option<Uuid>,
    pub log_date: Option<NaiveDate>,

    #[validate(length(min = 1, max = 200, message = "Please fill in a title (max 200 characters)"))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 5000,
        message = "Please fill in a description (max 5000 characters)"
    ))]
    pub description: String,

    #[validate(range(min = 1, max = 10, message = "Severity must be between 1 and 10"))]
    pub severity: Option<i32>,

    #[validate(length(max = 2048, message = "Image URL too long"))]
    pub image_url: Option<String>,
}

/// Insert payload handed to the store; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub title: String,
    pub description: String,
    pub severity: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Merge payload for an edit. `None` leaves the stored value untouched.
/// Never carries `created_at`.
#[derive(Debug, Clone)]
pub struct LogChanges {
    pub log_date: Option<NaiveDate>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<i32>,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first (clinical summary window).
    Ascending,
    /// Newest first (journal).
    Descending,
}

/// Equality filter on `user_id`, ordering on `created_at`, optional range
/// and result-count limit.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub user_id: Uuid,
    pub order: SortOrder,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl LogQuery {
    pub fn journal(user_id: Uuid) -> Self {
        Self {
            user_id,
            order: SortOrder::Descending,
            since: None,
            limit: None,
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        entry.user_id == self.user_id && self.since.map_or(true, |t| entry.created_at >= t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Events may have been lost; every subscriber must resnapshot.
    Resync,
}

/// One row-level change on the `logs` collection, as delivered by the store's
/// change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogChange {
    pub user_id: Uuid,
    pub log_id: Uuid,
    #[serde(rename = "op")]
    pub kind: ChangeKind,
}

impl LogChange {
    pub fn resync() -> Self {
        Self {
            user_id: Uuid::nil(),
            log_id: Uuid::nil(),
            kind: ChangeKind::Resync,
        }
    }

    /// Whether a subscriber for `user_id` has to refresh.
    pub fn concerns(&self, user_id: Uuid) -> bool {
        self.kind == ChangeKind::Resync || self.user_id == user_id
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentLogsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LogWindowQuery {
    pub days: Option<i64>,
}
