//! Chat and clinical-summary flows: load the user's data, build the prompt,
//! ask the model, and degrade to a canned reply when the model call fails.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

pub mod client;
pub mod prompt;

pub use client::{AssistantClient, AssistantError, Role, Turn};

use crate::error::{AppError, AppResult};
use crate::repo::{Clock, LogRepository, ProfileRepository};
use client::{CHAT_FALLBACK, REPORT_ERROR_FALLBACK, REPORT_ERROR_STATUS, REPORT_MALFORMED_FALLBACK};
use prompt::{build_chat_prompt, build_clinical_summary_prompt, CHAT_LOG_LIMIT, SUMMARY_WINDOW_DAYS};

pub const REPORT_OK_STATUS: &str = "Report generated successfully.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Gemini,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub reply: String,
    pub source: ReplySource,
}

#[derive(Debug, Clone)]
pub struct ClinicalReport {
    pub report: String,
    pub status: String,
    pub source: ReplySource,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Assistant {
    client: AssistantClient,
    logs: LogRepository,
    profiles: ProfileRepository,
    clock: Clock,
}

impl Assistant {
    pub fn new(client: AssistantClient, logs: LogRepository, profiles: ProfileRepository) -> Self {
        Self {
            client,
            logs,
            profiles,
            clock: Utc::now,
        }
    }

    /// One chat turn. `history` holds the earlier turns of the conversation;
    /// the question is appended as the latest user turn.
    pub async fn chat(
        &self,
        user_id: Uuid,
        question: &str,
        mut history: Vec<Turn>,
    ) -> AppResult<ChatReply> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Please enter a question.".into()));
        }

        let profile = self.profiles.load(user_id).await?;
        let recent = self.logs.list_recent(user_id, CHAT_LOG_LIMIT as i64).await?;
        let prompt = build_chat_prompt(&profile, &recent, question);
        history.push(Turn::user(question));

        let reply = match self.client.ask(&prompt, &history).await {
            Ok(text) => ChatReply {
                reply: text,
                source: ReplySource::Gemini,
            },
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Chat model call failed, using fallback");
                ChatReply {
                    reply: CHAT_FALLBACK.into(),
                    source: ReplySource::Fallback,
                }
            }
        };

        Ok(reply)
    }

    /// Doctor-visit summary over the last 90 days.
    pub async fn clinical_summary(
        &self,
        user_id: Uuid,
        visit_purpose: Option<&str>,
    ) -> AppResult<ClinicalReport> {
        let window_end = (self.clock)();
        let window_start = window_end - Duration::days(SUMMARY_WINDOW_DAYS);

        let profile = self.profiles.load(user_id).await?;
        let window = self.logs.list_window(user_id, window_start).await?;
        let prompt = build_clinical_summary_prompt(&profile, &window, visit_purpose);

        let (report, status, source) = match self.client.ask(&prompt, &[]).await {
            Ok(text) => (text, REPORT_OK_STATUS, ReplySource::Gemini),
            Err(AssistantError::MalformedResponse(detail)) => {
                tracing::warn!(user_id = %user_id, detail = %detail, "Unexpected report response structure");
                (
                    REPORT_MALFORMED_FALLBACK.to_string(),
                    REPORT_OK_STATUS,
                    ReplySource::Fallback,
                )
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Report model call failed");
                (
                    REPORT_ERROR_FALLBACK.to_string(),
                    REPORT_ERROR_STATUS,
                    ReplySource::Fallback,
                )
            }
        };

        tracing::info!(
            user_id = %user_id,
            entries = window.len(),
            source = ?source,
            "Clinical summary generated"
        );

        Ok(ClinicalReport {
            report,
            status: status.into(),
            source,
            window_start,
            window_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::log_entry::LogDraft;
    use crate::models::profile::ProfilePatch;
    use crate::models::profile::Profile;
    use crate::store::memory::MemoryStore;
    use crate::store::{ProfileStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn assistant_for(server: &MockServer, store: &MemoryStore) -> Assistant {
        let config = Config {
            gemini_base_url: server.uri(),
            gemini_api_key: "k".into(),
            ..Config::default()
        };
        let client = AssistantClient::new(&config).unwrap();
        Assistant::new(
            client,
            LogRepository::new(Arc::new(store.clone())),
            ProfileRepository::new(Arc::new(store.clone())),
        )
    }

    fn reply(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[tokio::test]
    async fn test_chat_grounds_prompt_in_profile_and_logs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Asthma"))
            .and(body_string_contains("\\\"Wheezing\\\" (Severity: 6)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Try an inhaler check.")))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let assistant = assistant_for(&server, &store).await;
        let user = Uuid::new_v4();
        assistant
            .profiles
            .save(
                user,
                ProfilePatch {
                    personal_history: Some("Asthma".into()),
                    family_history: None,
                },
            )
            .await
            .unwrap();
        assistant
            .logs
            .save(
                user,
                LogDraft {
                    title: "Wheezing".into(),
                    description: "After a run".into(),
                    severity: Some(6),
                    ..LogDraft::default()
                },
            )
            .await
            .unwrap();

        let answer = assistant.chat(user, "Why?", Vec::new()).await.unwrap();
        assert_eq!(answer.reply, "Try an inhaler check.");
        assert_eq!(answer.source, ReplySource::Gemini);
    }

    #[tokio::test]
    async fn test_chat_falls_back_on_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let answer = assistant_for(&server, &store)
            .await
            .chat(Uuid::new_v4(), "hello", Vec::new())
            .await
            .unwrap();

        assert_eq!(answer.reply, CHAT_FALLBACK);
        assert_eq!(answer.source, ReplySource::Fallback);
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_question() {
        let server = MockServer::start().await;
        let store = MemoryStore::new();
        let err = assistant_for(&server, &store)
            .await
            .chat(Uuid::new_v4(), "   ", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_report_with_empty_window() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("No health events logged in the past 90 days."))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Patient Health Summary")))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let report = assistant_for(&server, &store)
            .await
            .clinical_summary(Uuid::new_v4(), None)
            .await
            .unwrap();

        assert_eq!(report.report, "Patient Health Summary");
        assert_eq!(report.status, REPORT_OK_STATUS);
        assert_eq!(report.window_end - report.window_start, Duration::days(90));
    }

    #[tokio::test]
    async fn test_report_fallbacks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let report = assistant_for(&server, &store)
            .await
            .clinical_summary(Uuid::new_v4(), Some("checkup"))
            .await
            .unwrap();

        assert_eq!(report.report, REPORT_ERROR_FALLBACK);
        assert_eq!(report.status, REPORT_ERROR_STATUS);
        assert_eq!(report.source, ReplySource::Fallback);
    }

    #[tokio::test]
    async fn test_report_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let report = assistant_for(&server, &store)
            .await
            .clinical_summary(Uuid::new_v4(), None)
            .await
            .unwrap();

        assert_eq!(report.report, REPORT_MALFORMED_FALLBACK);
        assert_eq!(report.source, ReplySource::Fallback);
    }

    struct UnavailableProfiles;

    #[async_trait]
    impl ProfileStore for UnavailableProfiles {
        async fn get_profile(&self, _user_id: Uuid) -> StoreResult<Option<Profile>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn merge_profile(
            &self,
            _user_id: Uuid,
            _patch: ProfilePatch,
            _updated_at: DateTime<Utc>,
        ) -> StoreResult<Profile> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_masked_by_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let config = Config {
            gemini_base_url: server.uri(),
            ..Config::default()
        };
        let assistant = Assistant::new(
            AssistantClient::new(&config).unwrap(),
            LogRepository::new(Arc::new(MemoryStore::new())),
            ProfileRepository::new(Arc::new(UnavailableProfiles)),
        );
        let user = Uuid::new_v4();

        let err = assistant.chat(user, "hello", Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));

        let err = assistant.clinical_summary(user, None).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }
}
