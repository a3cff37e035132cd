//! OpenWebUI-compatible chat bridge client.
//!
//! Forwards chat-completion requests upstream. A `persona_prompt`, when
//! present, is folded into the message list (prepended to the first system
//! message, or inserted as a new system message at position 0) and removed
//! from the forwarded payload.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fr0g_core::config::OpenWebUiConfig;

use crate::error::{ClientError, Result};

/// Longest accepted persona prompt, in characters.
const PERSONA_PROMPT_MAX_CHARS: usize = 8_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// One of `system`, `user`, `assistant`, `function`.
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Consumed by the bridge; never forwarded upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionRequest {
    /// Boundary validation per the wire contract.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ClientError::InvalidRequest("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(ClientError::InvalidRequest("messages must not be empty".into()));
        }
        for message in &self.messages {
            if !matches!(message.role.as_str(), "system" | "user" | "assistant" | "function") {
                return Err(ClientError::InvalidRequest(format!(
                    "unknown role '{}'",
                    message.role
                )));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ClientError::InvalidRequest(format!(
                    "temperature {t} outside [0, 2]"
                )));
            }
        }
        if let Some(m) = self.max_tokens {
            if !(1..=32_000).contains(&m) {
                return Err(ClientError::InvalidRequest(format!(
                    "max_tokens {m} outside [1, 32000]"
                )));
            }
        }
        if let Some(p) = &self.persona_prompt {
            if p.chars().count() > PERSONA_PROMPT_MAX_CHARS {
                return Err(ClientError::InvalidRequest(format!(
                    "persona_prompt exceeds {PERSONA_PROMPT_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }

    /// Fold `persona_prompt` into the message list and drop the field.
    pub fn apply_persona_prompt(&mut self) {
        let Some(prompt) = self.persona_prompt.take() else {
            return;
        };
        match self.messages.iter_mut().find(|m| m.role == "system") {
            Some(system) => {
                system.content = if system.content.is_empty() {
                    prompt
                } else {
                    format!("{prompt}\n\n{}", system.content)
                };
            }
            None => {
                self.messages.insert(
                    0,
                    ChatMessage {
                        role: "system".to_string(),
                        content: prompt,
                    },
                );
            }
        }
    }
}

/// Retrying client for the upstream chat endpoint. Server-side failures and
/// transport errors back off and retry like the SMS client; client-side
/// rejections surface immediately.
pub struct ChatBridgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: crate::retry::RetryPolicy,
}

impl ChatBridgeClient {
    pub fn new(config: &OpenWebUiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            policy: crate::retry::RetryPolicy::default(),
        })
    }

    /// Validate, fold the persona prompt, and forward upstream.
    pub async fn completion(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        request.validate()?;
        request.apply_persona_prompt();
        debug!(model = %request.model, messages = request.messages.len(), "forwarding chat completion");

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if retryable(&e) && attempt < self.policy.max_retries() => {
                    let delay = self.policy.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/api/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder.send().await?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ClientError::RateLimited);
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }
        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

fn retryable(error: &ClientError) -> bool {
    match error {
        ClientError::Api { status, .. } => *status >= 500,
        ClientError::Transport(_) => true,
        _ => false,
    }
}
