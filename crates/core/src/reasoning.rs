//! # Reasoning Capability
//!
//! External text-generation collaborator used to refine intent
//! classification and, eventually, agent rationale. The endpoint is
//! treated as opaque and possibly failing; transient failures are
//! retried with exponential backoff before surfacing to the caller.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("rate limited by the reasoning endpoint")]
    RateLimited,
    #[error("reasoning quota exhausted")]
    QuotaExhausted,
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("reasoning endpoint returned status {0}")]
    Http(u16),
    #[error("malformed reasoning response: {0}")]
    Malformed(String),
}

impl ReasoningError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ReasoningError::RateLimited | ReasoningError::Connection(_) => true,
            ReasoningError::Http(status) => *status >= 500,
            _ => false,
        }
    }
}

/// One generation request: a system framing, the user prompt, and an
/// optional JSON schema constraining structured output
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningRequest {
    pub system: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ReasoningRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            schema: None,
        }
    }

    /// Attach the JSON schema of `T` as the expected output shape
    pub fn with_schema<T: JsonSchema>(mut self) -> Self {
        self.schema = serde_json::to_value(schemars::schema_for!(T)).ok();
        self
    }
}

#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

/// Retry `generate` on retryable failures with exponential backoff,
/// up to `max_attempts` total attempts.
pub async fn with_backoff<C>(
    capability: &C,
    request: &ReasoningRequest,
    max_attempts: u32,
) -> Result<String, ReasoningError>
where
    C: ReasoningCapability + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        match capability.generate(request).await {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                let delay = BACKOFF_BASE_MS * 2u64.saturating_pow(attempt);
                tracing::warn!(error = %err, attempt, delay_ms = delay, "reasoning call failed; retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Connection settings for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSettings {
    /// Full chat-completions URL
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// `reqwest`-backed client against an OpenAI-compatible endpoint
pub struct HttpReasoner {
    client: reqwest::Client,
    settings: ReasoningSettings,
}

impl HttpReasoner {
    pub fn new(settings: ReasoningSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }
}

#[async_trait]
impl ReasoningCapability for HttpReasoner {
    async fn generate(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let mut prompt = request.prompt.clone();
        if let Some(schema) = &request.schema {
            prompt.push_str("\n\nRespond with JSON matching this schema:\n");
            prompt.push_str(&schema.to_string());
        }
        let body = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": prompt },
            ],
        });

        let mut http = self.client.post(&self.settings.endpoint).json(&body);
        if let Some(key) = &self.settings.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| ReasoningError::Connection(e.to_string()))?;
        let status = response.status();
        match status.as_u16() {
            429 => return Err(ReasoningError::RateLimited),
            402 => return Err(ReasoningError::QuotaExhausted),
            code if !status.is_success() => return Err(ReasoningError::Http(code)),
            _ => {}
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReasoningError::Malformed("missing message content".to_string()))
    }
}

/// Canned responder for tests: pops results in order, then fails
pub struct ScriptedReasoner {
    script: std::sync::Mutex<std::collections::VecDeque<Result<String, ReasoningError>>>,
}

impl ScriptedReasoner {
    pub fn new(script: Vec<Result<String, ReasoningError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoner {
    async fn generate(&self, _request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        script
            .pop_front()
            .unwrap_or(Err(ReasoningError::Connection("script exhausted".to_string())))
    }
}
