//! Google Gemini `generateContent` provider
//!
//! Text and image requests share one endpoint; images travel as `inline_data`
//! parts next to the prompt.

use crate::{image, LlmError};
use billsort_domain::traits::LlmProvider as LlmProviderTrait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini API base URL
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default timeout for Gemini requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Provider for the Gemini REST API
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    max_retries: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String, LlmError> {
        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            match self.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => LlmError::InvalidResponse(format!("prompt blocked: {}", reason)),
                None => LlmError::InvalidResponse("response has no candidates".to_string()),
            }
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "candidate has no text".to_string(),
            ));
        }
        Ok(text)
    }
}

impl GeminiProvider {
    /// Create a provider for `base_url` authenticating with `api_key`
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Configuration(
                "GEMINI_API_KEY is not set".to_string(),
            ));
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

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request(&self, parts: Vec<Value>) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }

    fn generate_content(&self, parts: Vec<Value>) -> Result<String, LlmError> {
        let url = self.endpoint();
        let body = self.request(parts);

        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: GenerateResponse = response.json().map_err(|e| {
                            LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                        })?;
                        return parsed.into_text();
                    } else if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(LlmError::ModelNotAvailable(self.model.clone()));
                    } else if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
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
                debug!(attempt = attempts, ?delay, "retrying generateContent request");
                std::thread::sleep(delay);
            }
        }

        let err = last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string()));
        warn!(model = %self.model, error = %err, "Gemini request failed");
        Err(err)
    }
}

fn text_part(prompt: &str) -> Value {
    json!({ "text": prompt })
}

fn inline_image_part(mime: &str, encoded: &str) -> Value {
    json!({ "inline_data": { "mime_type": mime, "data": encoded } })
}

impl LlmProviderTrait for GeminiProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        self.generate_content(vec![text_part(prompt)])
    }

    fn generate_with_image(&self, prompt: &str, image_path: &Path) -> Result<String, Self::Error> {
        let encoded = image::encode_base64(image_path)?;
        let mime = image::mime_type(image_path);
        self.generate_content(vec![text_part(prompt), inline_image_part(mime, &encoded)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            GEMINI_BASE_URL,
            "test-key",
            DEFAULT_MODEL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_key() {
        let result = GeminiProvider::new(GEMINI_BASE_URL, "", DEFAULT_MODEL, Duration::from_secs(5));
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            provider().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_image_request_shape() {
        let request = provider().request(vec![
            text_part("read this"),
            inline_image_part("image/png", "AAAA"),
        ]);
        let value = serde_json::to_value(&request).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "read this");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"invoice_number\":"},{"text":"\"1\"}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), r#"{"invoice_number":"1"}"#);
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_unreachable_server() {
        let provider = GeminiProvider::new(
            "http://127.0.0.1:9/v1beta",
            "test-key",
            DEFAULT_MODEL,
            Duration::from_secs(2),
        )
        .unwrap()
        .with_max_retries(1);
        assert!(matches!(
            provider.generate("hello"),
            Err(LlmError::Communication(_))
        ));
    }

    #[test]
    fn test_missing_image_fails_before_request() {
        let result = provider().generate_with_image("p", Path::new("/no/such/image.jpg"));
        assert!(matches!(result, Err(LlmError::Image(_))));
    }
}
