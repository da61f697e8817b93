//! Sentiment oracle clients (raw HTTP via reqwest).
//!
//! Both the primary (local, OpenAI-compatible server) and the fallback
//! (hosted API) speak the `/v1/chat/completions` protocol, so one client
//! covers both roles.

use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::sentiment::prompts::SYSTEM_PROMPT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENDPOINT_CHAT: &str = "/v1/chat/completions";
const ENDPOINT_MODELS: &str = "/v1/models";
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 1024;

/// An external sentiment scoring service.
#[async_trait]
pub trait SentimentOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap liveness probe; a dead primary routes straight to the fallback.
    async fn is_live(&self) -> bool;

    /// One request for one symbol. Returns the raw response text, expected to
    /// contain a JSON-shaped verdict.
    async fn query(&self, coin: &str, prompt: &str) -> BotResult<String>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

fn content_from_response(response: ChatResponse) -> Option<String> {
    let content = response.choices.into_iter().next()?.message.content;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// OpenAI-compatible chat completions client.
pub struct HttpOracle {
    name: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    liveness_timeout: Duration,
}

impl HttpOracle {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
        liveness_timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(timeout_secs),
            liveness_timeout: Duration::from_secs(liveness_timeout_secs),
        }
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: false,
        }
    }
}

#[async_trait]
impl SentimentOracle for HttpOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_live(&self) -> bool {
        let url = format!("{}{}", self.base_url, ENDPOINT_MODELS);
        let mut request = self.client.get(&url).timeout(self.liveness_timeout);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                logger::debug(
                    LogTag::Sentiment,
                    &format!("[{}] liveness probe failed: {}", self.name, e),
                );
                false
            }
        }
    }

    async fn query(&self, coin: &str, prompt: &str) -> BotResult<String> {
        let url = format!("{}{}", self.base_url, ENDPOINT_CHAT);
        let body = self.build_request(prompt);

        logger::debug(
            LogTag::Sentiment,
            &format!("[{}] querying model {} for {}", self.name, self.model, coin),
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BotError::OracleUnavailable(format!("[{}] {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::OracleUnavailable(format!(
                "[{}] status {}: {}",
                self.name, status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BotError::OracleMalformed(format!("[{}] {}", self.name, e)))?;

        content_from_response(parsed).ok_or_else(|| {
            BotError::OracleMalformed(format!("[{}] response has no content", self.name))
        })
    }
}
