//! Content generation through an OpenAI-compatible chat completions endpoint
//!
//! Each note is generated from a fresh two-message conversation: the active
//! system prompt plus an instruction (optionally carrying user guidance). No
//! history is kept between notes.

use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use async_trait::async_trait;
use murmur_core::config::ModelSection;
use murmur_core::sanitize::truncate_with_marker;
use murmur_core::{MurmurError, Result};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: usize = 500;
const DEFAULT_TEMPERATURE: f32 = 0.9;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CHARS: usize = 2000;

const PLAIN_INSTRUCTION: &str = "Write one short post for a decentralized social network. \
     Keep it concise (under 500 characters), engaging, and authentic. \
     No hashtags unless natural.";

const GUIDED_INSTRUCTION: &str = "Write one short post following this guidance. \
     Keep it concise (under 500 characters), engaging, and authentic.";

/// Produces note text from a system prompt and optional guidance
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, guidance: Option<&str>) -> Result<String>;
}

/// Generator backed by a chat completions HTTP API (OpenRouter by default)
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: usize,
    temperature: f32,
    max_chars: usize,
}

impl ChatCompletionsGenerator {
    /// Create a generator for `model` at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MurmurError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_chars: DEFAULT_MAX_CHARS,
        })
    }

    /// Build from the `[model]` config section, reading the key from its env var
    pub fn from_config(section: &ModelSection) -> Result<Self> {
        let api_key = crate::auth::get_api_key(&section.api_key_env)?;
        Self::new(&section.base_url, &section.name, api_key)
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the character ceiling applied to generated text
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, prompt: &str, guidance: Option<&str>) -> ChatRequest {
        let instruction = match guidance {
            Some(guidance) => format!("User guidance: {}\n\n{}", guidance, GUIDED_INSTRUCTION),
            None => PLAIN_INSTRUCTION.to_string(),
        };

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(prompt), ChatMessage::user(instruction)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str, guidance: Option<&str>) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(MurmurError::Validation(
                "System prompt is not set".to_string(),
            ));
        }
        if matches!(guidance, Some(g) if g.trim().is_empty()) {
            return Err(MurmurError::Validation(
                "Guidance cannot be empty".to_string(),
            ));
        }

        let request = self.build_request(prompt, guidance);
        tracing::debug!(model = %self.model, guided = guidance.is_some(), "Sending generation request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MurmurError::Http(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(MurmurError::Generation(format!(
                "Model API error {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| MurmurError::Generation(format!("Failed to parse response: {}", e)))?;

        let output = body
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if output.is_empty() {
            return Err(MurmurError::Generation(
                "Model returned empty content".to_string(),
            ));
        }

        let (content, truncated) = truncate_with_marker(&output, self.max_chars);
        if truncated {
            tracing::warn!(
                "Generated content too long ({} chars), truncated to {}",
                output.chars().count(),
                self.max_chars
            );
        }

        if let Some(usage) = body.usage {
            tracing::info!(
                "Generated content ({} chars, {} prompt tokens, {} completion tokens)",
                content.chars().count(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        } else {
            tracing::info!("Generated content ({} chars)", content.chars().count());
        }

        Ok(content)
    }
}
