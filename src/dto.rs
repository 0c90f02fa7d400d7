//! Request/response bodies of the HTTP API.
//!
//! Conventions:
//! - `*Request`  → deserialized from client JSON body or query params
//! - `*Response` → serialized to client JSON
//! - validation lives on the request types via `validator` derives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::assistant::{ChatReply, ClinicalReport, ReplySource, Turn};
use crate::models::log_entry::LogEntry;
use crate::models::profile::Profile;

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: Uuid,
    pub status: String,
}

// ============================================================================
// Auth
// ============================================================================

/// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Please enter a valid email address."))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 6, max = 128, message = "Password must be at least 6 characters long."))]
    pub password: String,
}

/// POST /api/auth/login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by register, login, guest and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub is_anonymous: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub status: String,
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub logs: Vec<LogEntry>,
    pub count: usize,
}

impl From<Vec<LogEntry>> for LogListResponse {
    fn from(logs: Vec<LogEntry>) -> Self {
        Self {
            count: logs.len(),
            logs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveLogResponse {
    pub log: LogEntry,
    pub status: String,
}

// ============================================================================
// Calendar
// ============================================================================

/// GET /api/calendar?year=&month=. Missing fields default to the current month.
#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

// ============================================================================
// Assistant
// ============================================================================

/// POST /api/assistant/chat
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000, message = "Question must be 1-4000 characters"))]
    pub question: String,

    /// Earlier turns of this conversation, oldest first.
    #[serde(default)]
    #[validate(custom = "validate_history")]
    pub history: Vec<Turn>,
}

pub const MAX_HISTORY_TURNS: usize = 40;
pub const MAX_TURN_CHARS: usize = 4000;

fn validate_history(history: &[Turn]) -> Result<(), ValidationError> {
    let too_long = history.len() > MAX_HISTORY_TURNS
        || history.iter().any(|t| t.text.chars().count() > MAX_TURN_CHARS);
    if too_long {
        let mut err = ValidationError::new("history");
        err.message = Some(
            format!(
                "History is limited to {MAX_HISTORY_TURNS} turns of {MAX_TURN_CHARS} characters"
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub source: ReplySource,
}

impl From<ChatReply> for ChatResponse {
    fn from(r: ChatReply) -> Self {
        Self {
            reply: r.reply,
            source: r.source,
        }
    }
}

/// POST /api/assistant/report
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReportRequest {
    #[validate(length(max = 1000, message = "Visit purpose is too long"))]
    pub visit_purpose: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: String,
    pub status: String,
    pub source: ReplySource,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl From<ClinicalReport> for ReportResponse {
    fn from(r: ClinicalReport) -> Self {
        Self {
            report: r.report,
            status: r.status,
            source: r.source,
            window_start: r.window_start,
            window_end: r.window_end,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
