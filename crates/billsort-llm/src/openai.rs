//! OpenAI-compatible chat-completions provider
//!
//! Serves both OpenAI and DeepSeek, which expose the same `/chat/completions`
//! API under different base URLs.

use crate::{image, LlmError};
use billsort_domain::traits::LlmProvider as LlmProviderTrait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// DeepSeek API base URL
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Default timeout for hosted API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MAX_TOKENS: u32 = 2048;

/// Provider for any API speaking the OpenAI chat-completions protocol
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    max_retries: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for `base_url` authenticating with `api_key`
    ///
    /// An empty key is rejected up front rather than on the first request.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Configuration("API key is not set".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: 0.1,
        })
    }

    /// OpenAI with the default base URL
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(
            OPENAI_BASE_URL,
            api_key,
            model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// DeepSeek with the default base URL
    pub fn deepseek(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(
            DEEPSEEK_BASE_URL,
            api_key,
            model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Set the maximum number of attempts per request
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat(&self, content: Value) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: ChatResponse = response.json().map_err(|e| {
                            LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                        })?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .ok_or_else(|| {
                                LlmError::InvalidResponse("response has no choices".to_string())
                            });
                    } else if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(LlmError::ModelNotAvailable(self.model.clone()));
                    } else if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(LlmError::Configuration("API key rejected".to_string()));
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(LlmError::RateLimitExceeded);
                    } else {
                        let error_text = response
                            .text()
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        last_error = Some(LlmError::Communication(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    }
                }
                Err(e) => {
                    last_error = Some(LlmError::Communication(format!("Request failed: {}", e)));
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                debug!(attempt = attempts, ?delay, "retrying chat request");
                std::thread::sleep(delay);
            }
        }

        let err = last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string()));
        warn!(base_url = %self.base_url, error = %err, "chat request failed");
        Err(err)
    }
}

/// Content parts for a text + image message
fn image_content(prompt: &str, mime: &str, encoded: &str) -> Value {
    json!([
        { "type": "text", "text": prompt },
        {
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", mime, encoded) }
        }
    ])
}

impl LlmProviderTrait for OpenAiCompatibleProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        self.chat(Value::String(prompt.to_string()))
    }

    fn generate_with_image(&self, prompt: &str, image_path: &Path) -> Result<String, Self::Error> {
        let encoded = image::encode_base64(image_path)?;
        let mime = image::mime_type(image_path);
        self.chat(image_content(prompt, mime, &encoded))
    }
}
