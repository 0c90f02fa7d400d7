use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;

pub const CHAT_FALLBACK: &str =
    "Sorry, I'm having trouble connecting right now. Please try again later.";
pub const REPORT_MALFORMED_FALLBACK: &str =
    "Could not generate report: Invalid AI response structure.";
pub const REPORT_ERROR_FALLBACK: &str = "Could not generate the report due to an error.";
pub const REPORT_ERROR_STATUS: &str = "An error occurred. Please try again.";

const REPLY_POINTER: &str = "/candidates/0/content/parts/0/text";

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Model API error {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model request failed: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Thin client for the hosted generative-language `generateContent` endpoint.
#[derive(Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl AssistantClient {
    pub fn new(config: &Config) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.assistant_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.gemini_api_key.clone(),
        })
    }

    /// Sends `prompt` as the opening user turn followed by `history`, and
    /// returns the first candidate's text.
    pub async fn ask(&self, prompt: &str, history: &[Turn]) -> Result<String, AssistantError> {
        let opening = Turn::user(prompt);
        let contents: Vec<Value> = std::iter::once(&opening)
            .chain(history)
            .map(|turn| {
                json!({
                    "role": turn.role,
                    "parts": [{ "text": turn.text }],
                })
            })
            .collect();

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "contents": contents }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Transport { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AssistantError::MalformedResponse(e.to_string()))?;

        extract_reply(&body)
    }
}

pub fn extract_reply(body: &Value) -> Result<String, AssistantError> {
    body.pointer(REPLY_POINTER)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AssistantError::MalformedResponse("missing candidates[0].content.parts[0].text".into())
        })
}
