//! Repositories over the document store, scoped by owning user.

use chrono::{DateTime, Utc};

pub mod logs;
pub mod profile;

pub use logs::{LogRepository, LogSubscription};
pub use profile::ProfileRepository;

/// Source of "now" for `created_at`/`updated_at` stamps.
pub type Clock = fn() -> DateTime<Utc>;
