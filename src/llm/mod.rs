//! Reqwest-based model client for OpenAI-compatible Chat Completions.
//!
//! Responses are buffered rather than streamed: the orchestrator has to see
//! the whole reply before it can extract a pipeline from it.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("MISTRAL_API_KEY is not set; export it or add it to the rc file")]
    MissingApiKey,
    #[error("request to model endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Api { status: reqwest::StatusCode, body: String },
    #[error("model response contained no message content")]
    EmptyResponse,
}

impl ModelError {
    /// Transport faults and throttling/server statuses are worth retrying
    /// with backoff; auth and bad-request statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Api { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Seam between the orchestrator and the external model service, so the
/// orchestration loop can be driven by a scripted backend in tests.
pub trait LanguageModel {
    fn complete(
        &self,
        messages: Vec<ChatMessage>,
        opts: &ChatOptions,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self, ModelError> {
        let api_key = cfg.api_key().ok_or(ModelError::MissingApiKey)?;
        let timeout = cfg
            .get("REQUEST_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        let api_base_url = cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into());
        let mut base_url = if api_base_url == "default" {
            "https://api.mistral.ai/v1".to_string()
        } else {
            api_base_url
        };
        let trimmed = base_url.trim_end_matches('/');
        if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
            base_url = format!("{}/v1", trimmed);
        } else {
            base_url = trimmed.to_string();
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self { http, base_url, api_key })
    }
}

impl LanguageModel for LlmClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        opts: &ChatOptions,
    ) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let hv = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| ModelError::MissingApiKey)?;
        headers.insert(AUTHORIZATION, hv);

        let body = serde_json::json!({
            "model": opts.model,
            "temperature": opts.temperature,
            "max_tokens": opts.max_tokens,
            "messages": messages,
        });

        let resp = self.http.post(url).headers(headers).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
